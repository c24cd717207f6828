//! Downstream destination for detected anomalies

use crate::error::PublishError;
use crate::types::AnomalyResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Accepts annotated trades. Called exactly once per anomalous trade.
#[async_trait]
pub trait AnomalySink: Send + Sync {
    async fn publish(&self, anomaly: &AnomalyResult) -> Result<(), PublishError>;
}

/// A published message as it would appear on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Keeps published anomalies in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SinkRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AnomalySink for MemorySink {
    async fn publish(&self, anomaly: &AnomalyResult) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(anomaly).map_err(|source| PublishError::Serialize {
            key: anomaly.key(),
            source,
        })?;
        self.records.lock().push(SinkRecord {
            key: anomaly.key(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnomalyLabel, TradeEvent};

    #[tokio::test]
    async fn test_memory_sink_records() {
        let sink = MemorySink::new();
        let shared = sink.clone();
        let result = AnomalyResult::new(
            TradeEvent::new("t-9", "Q", 1.0, 1.0),
            vec![AnomalyLabel::HighVolume],
        );

        sink.publish(&result).await.unwrap();

        let records = shared.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "t-9");
        let payload: serde_json::Value = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(payload["anomalies"][0], "High Volume");
    }
}
