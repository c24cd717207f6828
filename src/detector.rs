//! Per-event anomaly detection over owned pipeline state

use crate::config::AppConfig;
use crate::dedup::Deduplicator;
use crate::error::DecodeError;
use crate::rules::RuleEngine;
use crate::scorer::OutlierScorer;
use crate::types::{AnomalyLabel, AnomalyResult, TradeEvent};
use tracing::debug;

/// What happened to one trade.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Sequence already processed; nothing was evaluated
    Duplicate,
    /// Evaluated, no detector fired
    Clean,
    /// At least one detector fired
    Anomalous(AnomalyResult),
}

/// Owns all detection state: seen sequences, per-symbol rule state and the
/// outlier scorer.
///
/// Built once at startup and driven by a single consumer. Dropping it waits for
/// any background refit to finish.
#[derive(Debug)]
pub struct AnomalyDetector {
    dedup: Deduplicator,
    rules: RuleEngine,
    scorer: OutlierScorer,
}

impl AnomalyDetector {
    pub fn new(config: &AppConfig) -> Self {
        Self::from_parts(
            Deduplicator::from_window(config.dedup.window),
            RuleEngine::new(config.rules.clone()),
            OutlierScorer::new(&config.scorer),
        )
    }

    pub fn from_parts(dedup: Deduplicator, rules: RuleEngine, scorer: OutlierScorer) -> Self {
        Self {
            dedup,
            rules,
            scorer,
        }
    }

    /// Decode a raw payload and inspect it.
    ///
    /// A payload that fails to decode leaves every piece of state untouched.
    pub fn process(&mut self, payload: &[u8]) -> Result<Detection, DecodeError> {
        let trade = TradeEvent::decode(payload)?;
        Ok(self.inspect(trade))
    }

    /// Run a decoded trade through deduplication and all three detectors.
    pub fn inspect(&mut self, trade: TradeEvent) -> Detection {
        if self.dedup.check_and_record(&trade.sequence) {
            debug!(sequence = %trade.sequence, symbol = %trade.symbol, "Duplicate trade dropped");
            return Detection::Duplicate;
        }

        // every detector runs, labels accumulate
        let verdict = self.rules.evaluate(&trade);
        let outlier = self.scorer.score(trade.price);

        let mut anomalies = Vec::with_capacity(3);
        if verdict.high_volume {
            anomalies.push(AnomalyLabel::HighVolume);
        }
        if verdict.rapid_price_change {
            anomalies.push(AnomalyLabel::RapidPriceChange);
        }
        if outlier {
            anomalies.push(AnomalyLabel::IsolationForest);
        }

        if anomalies.is_empty() {
            Detection::Clean
        } else {
            Detection::Anomalous(AnomalyResult::new(trade, anomalies))
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn scorer(&self) -> &OutlierScorer {
        &self.scorer
    }

    /// Block until background refits have been installed.
    pub fn wait_for_training(&mut self) {
        self.scorer.wait_for_training();
    }
}
