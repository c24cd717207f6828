//! Message handling: decode, detect, publish

use crate::detector::{AnomalyDetector, Detection};
use crate::error::PublishError;
use crate::metrics::PipelineMetrics;
use crate::sink::AnomalySink;
use crate::types::AnomalyLabel;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the pipeline did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload could not be decoded and was dropped
    Malformed,
    /// Sequence already processed
    Duplicate,
    /// No detector fired
    Clean,
    /// Anomaly accepted by the sink
    Published(Vec<AnomalyLabel>),
}

/// Drives an [`AnomalyDetector`] and forwards anomalies to a sink.
pub struct Pipeline<S> {
    detector: AnomalyDetector,
    sink: S,
    metrics: Arc<PipelineMetrics>,
}

impl<S: AnomalySink> Pipeline<S> {
    pub fn new(detector: AnomalyDetector, sink: S, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            detector,
            sink,
            metrics,
        }
    }

    /// Handle one raw message.
    ///
    /// Malformed payloads are logged and reported as [`Outcome::Malformed`]. A sink
    /// failure is returned to the caller; the trade has already been recorded as
    /// seen by then.
    pub async fn handle(&mut self, payload: &[u8]) -> Result<Outcome, PublishError> {
        let start_time = Instant::now();
        self.metrics.record_received();

        let detection = match self.detector.process(payload) {
            Ok(detection) => detection,
            Err(e) => {
                self.metrics.record_decode_failure();
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Failed to parse trade data"
                );
                return Ok(Outcome::Malformed);
            }
        };

        match detection {
            Detection::Duplicate => {
                self.metrics.record_duplicate();
                Ok(Outcome::Duplicate)
            }
            Detection::Clean => {
                self.metrics.record_evaluated(start_time.elapsed());
                Ok(Outcome::Clean)
            }
            Detection::Anomalous(result) => {
                self.metrics.record_evaluated(start_time.elapsed());

                if let Err(e) = self.sink.publish(&result).await {
                    self.metrics.record_publish_failure();
                    return Err(e);
                }
                self.metrics.record_published(&result.anomalies);

                info!(
                    sequence = %result.trade.sequence,
                    symbol = %result.trade.symbol,
                    price = result.trade.price,
                    size = result.trade.size,
                    anomalies = ?result.anomalies,
                    processing_time_us = start_time.elapsed().as_micros() as u64,
                    "Anomaly detected"
                );
                Ok(Outcome::Published(result.anomalies))
            }
        }
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Wait for background refits, then hand back the detector.
    pub fn shutdown(mut self) -> AnomalyDetector {
        debug!("Waiting for in-flight model refits");
        self.detector.wait_for_training();
        self.detector
    }
}
