//! Configuration management for the anomaly detection pipeline

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Where a new consumer starts reading the input stream.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Replay everything retained in the stream
    #[default]
    Earliest,
    /// Only messages published after the consumer is created
    Latest,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NATS connection and stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject carrying incoming trades
    pub input_subject: String,
    /// Subject for outgoing anomalies
    pub output_subject: String,
    /// JetStream stream that captures the input subject
    pub stream: String,
    /// Durable consumer name; consumers sharing it split the stream between them
    pub consumer_group: String,
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,
    /// Create the input stream if it does not exist
    #[serde(default = "default_true")]
    pub auto_create_topics: bool,
}

/// Per-symbol rule thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Size above which a trade is high volume
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: f64,
    /// Relative price move above which a trade is a rapid change
    #[serde(default = "default_price_change_threshold")]
    pub price_change_threshold: f64,
    /// Prices remembered per symbol
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Symbol-specific threshold overrides
    #[serde(default)]
    pub overrides: Vec<SymbolOverride>,
}

/// Threshold override for a single symbol. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SymbolOverride {
    pub symbol: String,
    pub volume_threshold: Option<f64>,
    pub price_change_threshold: Option<f64>,
}

/// Outlier scorer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Samples required before any scoring is attempted
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Corpus size multiple at which the model is refit
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval: usize,
    /// Trees per forest
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Sub-sample size per tree
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Expected share of outliers in the corpus
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Fixed RNG seed, random when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Fit on a worker thread instead of blocking the triggering event
    #[serde(default = "default_true")]
    pub background_retrain: bool,
}

/// Deduplication configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupConfig {
    /// Number of recent sequences remembered; unbounded when unset
    #[serde(default)]
    pub window: Option<usize>,
}

/// Anomaly publisher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    /// Retries after the first failed publish
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff, doubled on every retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between summaries, 0 disables periodic reporting
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}

fn default_volume_threshold() -> f64 {
    10_000.0
}

fn default_price_change_threshold() -> f64 {
    0.05
}

fn default_history_len() -> usize {
    100
}

fn default_min_samples() -> usize {
    100
}

fn default_retrain_interval() -> usize {
    1000
}

fn default_n_estimators() -> usize {
    1000
}

fn default_max_samples() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.01
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_report_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            volume_threshold: default_volume_threshold(),
            price_change_threshold: default_price_change_threshold(),
            history_len: default_history_len(),
            overrides: Vec::new(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            retrain_interval: default_retrain_interval(),
            n_estimators: default_n_estimators(),
            max_samples: default_max_samples(),
            contamination: default_contamination(),
            seed: None,
            background_retrain: true,
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, layered under the environment.
    ///
    /// `input_topic` and `output_topic` override the subjects; any other key can be
    /// set as `ANOMALY__<SECTION>__<KEY>`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("ANOMALY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("nats.input_subject", std::env::var("input_topic").ok())?
            .set_override_option("nats.output_subject", std::env::var("output_topic").ok())?;

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize::<AppConfig>()
            .context("Failed to deserialize configuration")?
            .validated()
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize::<AppConfig>()
            .context("Failed to deserialize configuration")?
            .validated()
    }

    fn validated(self) -> Result<Self> {
        anyhow::ensure!(
            self.scorer.retrain_interval > 0,
            "scorer.retrain_interval must be positive"
        );
        anyhow::ensure!(
            self.scorer.n_estimators > 0 && self.scorer.max_samples > 1,
            "scorer.n_estimators must be positive and scorer.max_samples above 1"
        );
        anyhow::ensure!(
            self.scorer.contamination > 0.0 && self.scorer.contamination <= 0.5,
            "scorer.contamination must be in (0, 0.5], got {}",
            self.scorer.contamination
        );
        anyhow::ensure!(
            self.rules.history_len > 0,
            "rules.history_len must be positive"
        );
        if let Some(window) = self.dedup.window {
            anyhow::ensure!(window > 0, "dedup.window must be positive when set");
        }
        Ok(self)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                input_subject: "stock".to_string(),
                output_subject: "anomalies".to_string(),
                stream: "STOCK".to_string(),
                consumer_group: "stock_anomaly_detector".to_string(),
                auto_offset_reset: OffsetReset::Earliest,
                auto_create_topics: true,
            },
            rules: RulesConfig::default(),
            scorer: ScorerConfig::default(),
            dedup: DedupConfig::default(),
            producer: ProducerConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
