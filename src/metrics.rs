//! Performance metrics and statistics tracking for the anomaly detection pipeline.

use crate::types::AnomalyLabel;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Payloads received from the transport
    pub messages_received: AtomicU64,
    /// Payloads that failed to decode
    pub decode_failures: AtomicU64,
    /// Redelivered sequences dropped
    pub duplicates: AtomicU64,
    /// Trades run through the detectors
    pub trades_evaluated: AtomicU64,
    /// Anomalies handed to the sink
    pub anomalies_published: AtomicU64,
    /// Anomalies the sink rejected
    pub publish_failures: AtomicU64,
    /// Anomalies by label, indexed like `AnomalyLabel::ALL`
    labels: [AtomicU64; 3],
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            trades_evaluated: AtomicU64::new(0),
            anomalies_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            labels: Default::default(),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trade that went through the detectors
    pub fn record_evaluated(&self, processing_time: Duration) {
        self.trades_evaluated.fetch_add(1, Ordering::Relaxed);

        let mut times = self.processing_times.write();
        times.push(processing_time.as_micros() as u64);
        // Keep only last 10000 for memory efficiency
        if times.len() > 10000 {
            times.drain(0..5000);
        }
    }

    /// Record a published anomaly and its labels
    pub fn record_published(&self, labels: &[AnomalyLabel]) {
        self.anomalies_published.fetch_add(1, Ordering::Relaxed);
        for label in labels {
            self.labels[Self::label_index(*label)].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn label_index(label: AnomalyLabel) -> usize {
        match label {
            AnomalyLabel::HighVolume => 0,
            AnomalyLabel::RapidPriceChange => 1,
            AnomalyLabel::IsolationForest => 2,
        }
    }

    /// Published anomalies carrying `label`
    pub fn label_count(&self, label: AnomalyLabel) -> u64 {
        self.labels[Self::label_index(label)].load(Ordering::Relaxed)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self.processing_times.read().clone();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (messages per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.messages_received.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let received = self.messages_received.load(Ordering::Relaxed);
        let evaluated = self.trades_evaluated.load(Ordering::Relaxed);
        let published = self.anomalies_published.load(Ordering::Relaxed);
        let anomaly_rate = if evaluated > 0 {
            (published as f64 / evaluated as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          STOCK ANOMALY DETECTOR - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Messages Received: {:>10}  │  Throughput: {:>7.1} msg/s ║",
            received,
            self.get_throughput()
        );
        info!(
            "║ Malformed: {:>8}  │  Duplicates: {:>8}  │  Evaluated: {:>8}",
            self.decode_failures.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
            evaluated
        );
        info!(
            "║ Anomalies Published: {:>8}  │  Anomaly Rate: {:>6.2}%     ║",
            published, anomaly_rate
        );
        info!(
            "║ Publish Failures:    {:>8}                                 ║",
            self.publish_failures.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Anomalies by Detector:                                       ║");
        for label in AnomalyLabel::ALL {
            let count = self.label_count(label);
            let pct = if published > 0 {
                (count as f64 / published as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:20}: {:>8} ({:>5.1}%)", label.as_str(), count, pct);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
