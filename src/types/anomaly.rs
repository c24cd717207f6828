//! Anomaly labels and annotated results

use crate::types::trade::{TradeEvent, ANOMALIES_FIELD};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Which detector flagged a trade.
///
/// Variant order is the order labels appear on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalyLabel {
    #[serde(rename = "High Volume")]
    HighVolume,
    #[serde(rename = "Rapid Price Change")]
    RapidPriceChange,
    #[serde(rename = "Isolation Forest")]
    IsolationForest,
}

impl AnomalyLabel {
    pub const ALL: [AnomalyLabel; 3] = [
        AnomalyLabel::HighVolume,
        AnomalyLabel::RapidPriceChange,
        AnomalyLabel::IsolationForest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::HighVolume => "High Volume",
            AnomalyLabel::RapidPriceChange => "Rapid Price Change",
            AnomalyLabel::IsolationForest => "Isolation Forest",
        }
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade annotated with the detectors that fired on it.
///
/// Serializes as the original input record plus an `anomalies` array.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyResult {
    pub trade: TradeEvent,
    pub anomalies: Vec<AnomalyLabel>,
}

impl AnomalyResult {
    pub fn new(trade: TradeEvent, mut anomalies: Vec<AnomalyLabel>) -> Self {
        anomalies.sort();
        anomalies.dedup();
        Self { trade, anomalies }
    }

    /// Output message key: the string form of the trade's sequence.
    pub fn key(&self) -> String {
        self.trade.sequence.to_string()
    }

    pub fn has(&self, label: AnomalyLabel) -> bool {
        self.anomalies.contains(&label)
    }
}

impl Serialize for AnomalyResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.trade.record();
        let mut map = serializer.serialize_map(Some(record.len() + 1))?;
        for (key, value) in record {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(ANOMALIES_FIELD, &self.anomalies)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_label_strings() {
        assert_eq!(
            serde_json::to_value(AnomalyLabel::HighVolume).unwrap(),
            json!("High Volume")
        );
        assert_eq!(AnomalyLabel::RapidPriceChange.to_string(), "Rapid Price Change");
        assert_eq!(AnomalyLabel::IsolationForest.as_str(), "Isolation Forest");
    }

    #[test]
    fn test_labels_are_ordered() {
        let trade = TradeEvent::new(1, "X", 10.0, 1.0);
        let result = AnomalyResult::new(
            trade,
            vec![AnomalyLabel::IsolationForest, AnomalyLabel::HighVolume],
        );

        assert_eq!(
            result.anomalies,
            vec![AnomalyLabel::HighVolume, AnomalyLabel::IsolationForest]
        );
    }

    #[test]
    fn test_anomaly_result_payload() {
        let trade = TradeEvent::from_value(json!({
            "sequence": 3,
            "symbol": "Y",
            "price": 50,
            "size": 20000,
            "timestamp": "2024-01-02T15:04:05Z"
        }))
        .unwrap();
        let result = AnomalyResult::new(trade, vec![AnomalyLabel::HighVolume]);

        let payload: Value = serde_json::to_value(&result).unwrap();
        assert_eq!(result.key(), "3");
        assert_eq!(payload["sequence"], 3);
        assert_eq!(payload["timestamp"], "2024-01-02T15:04:05Z");
        assert_eq!(payload["anomalies"], json!(["High Volume"]));
    }
}
