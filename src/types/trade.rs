//! Trade event data structures and payload decoding

use crate::error::DecodeError;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Field reserved for the labels attached on output.
pub const ANOMALIES_FIELD: &str = "anomalies";

/// Sequence identifier of a trade, used for deduplication and as the output message key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceId {
    Int(i64),
    /// Only used for values above `i64::MAX`
    UInt(u64),
    Text(String),
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceId::Int(n) => write!(f, "{}", n),
            SequenceId::UInt(n) => write!(f, "{}", n),
            SequenceId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SequenceId {
    fn from(value: i64) -> Self {
        SequenceId::Int(value)
    }
}

impl From<i32> for SequenceId {
    fn from(value: i32) -> Self {
        SequenceId::Int(value.into())
    }
}

impl From<u32> for SequenceId {
    fn from(value: u32) -> Self {
        SequenceId::Int(value.into())
    }
}

impl From<u64> for SequenceId {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(SequenceId::UInt(value), SequenceId::Int)
    }
}

impl From<&str> for SequenceId {
    fn from(value: &str) -> Self {
        SequenceId::Text(value.to_string())
    }
}

impl From<String> for SequenceId {
    fn from(value: String) -> Self {
        SequenceId::Text(value)
    }
}

impl From<SequenceId> for Value {
    fn from(value: SequenceId) -> Self {
        match value {
            SequenceId::Int(n) => Value::from(n),
            SequenceId::UInt(n) => Value::from(n),
            SequenceId::Text(s) => Value::from(s),
        }
    }
}

/// A single trade print from the input stream.
///
/// The typed fields are what the detectors look at. `record` keeps the whole input
/// object so that unknown fields (timestamps, venue, ...) survive to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub sequence: SequenceId,
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    record: Map<String, Value>,
}

impl TradeEvent {
    /// Create a trade with only the required fields.
    pub fn new(sequence: impl Into<SequenceId>, symbol: &str, price: f64, size: f64) -> Self {
        let sequence = sequence.into();
        let mut record = Map::new();
        record.insert("sequence".to_string(), sequence.clone().into());
        record.insert("symbol".to_string(), Value::from(symbol));
        record.insert("price".to_string(), Value::from(price));
        record.insert("size".to_string(), Value::from(size));

        Self {
            sequence,
            symbol: symbol.to_string(),
            price,
            size,
            record,
        }
    }

    /// Decode a raw message payload.
    ///
    /// Accepts a JSON object, or a JSON string whose content is a JSON object
    /// (producers that double-encode their records).
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        match value {
            Value::String(inner) => Self::from_value(serde_json::from_str(&inner)?),
            other => Self::from_value(other),
        }
    }

    /// Build a trade from an already-structured record.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut record) = value else {
            return Err(DecodeError::NotAnObject);
        };
        record.remove(ANOMALIES_FIELD);

        let sequence = match record.get("sequence") {
            None | Some(Value::Null) => return Err(DecodeError::MissingField("sequence")),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(SequenceId::Int)
                .or_else(|| n.as_u64().map(SequenceId::UInt))
                .ok_or_else(|| DecodeError::invalid("sequence", format!("not an integer: {}", n)))?,
            Some(Value::String(s)) if !s.is_empty() => SequenceId::Text(s.clone()),
            Some(other) => {
                return Err(DecodeError::invalid(
                    "sequence",
                    format!("expected integer or non-empty string, got {}", other),
                ))
            }
        };

        let symbol = match record.get("symbol") {
            None | Some(Value::Null) => return Err(DecodeError::MissingField("symbol")),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) => {
                return Err(DecodeError::invalid(
                    "symbol",
                    format!("expected non-empty string, got {}", other),
                ))
            }
        };

        let price = number_field(&record, "price")?;
        if price <= 0.0 {
            return Err(DecodeError::invalid(
                "price",
                format!("must be positive, got {}", price),
            ));
        }

        let size = number_field(&record, "size")?;
        if size < 0.0 {
            return Err(DecodeError::invalid(
                "size",
                format!("must be non-negative, got {}", size),
            ));
        }

        Ok(Self {
            sequence,
            symbol,
            price,
            size,
            record,
        })
    }

    /// The full input record, including fields the detectors do not use.
    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }
}

fn number_field(record: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| DecodeError::invalid(field, format!("not a finite number: {}", n))),
        Some(other) => Err(DecodeError::invalid(
            field,
            format!("expected number, got {}", other),
        )),
    }
}

impl Serialize for TradeEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_trade() {
        let payload = br#"{"sequence": 7, "symbol": "AAPL", "price": 189.5, "size": 300}"#;
        let trade = TradeEvent::decode(payload).unwrap();

        assert_eq!(trade.sequence, SequenceId::Int(7));
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.price, 189.5);
        assert_eq!(trade.size, 300.0);
    }

    #[test]
    fn test_decode_double_encoded() {
        let inner = r#"{"sequence": "abc-1", "symbol": "MSFT", "price": 410, "size": 5}"#;
        let payload = serde_json::to_vec(&Value::String(inner.to_string())).unwrap();
        let trade = TradeEvent::decode(&payload).unwrap();

        assert_eq!(trade.sequence, SequenceId::Text("abc-1".to_string()));
        assert_eq!(trade.sequence.to_string(), "abc-1");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            TradeEvent::decode(b"not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            TradeEvent::decode(b"[1, 2, 3]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            TradeEvent::decode(br#"{"symbol": "X", "price": 1, "size": 1}"#),
            Err(DecodeError::MissingField("sequence"))
        ));
        assert!(matches!(
            TradeEvent::decode(br#"{"sequence": 1, "symbol": "X", "price": 0, "size": 1}"#),
            Err(DecodeError::InvalidField { field: "price", .. })
        ));
        assert!(matches!(
            TradeEvent::decode(br#"{"sequence": 1, "symbol": "X", "price": 1, "size": -5}"#),
            Err(DecodeError::InvalidField { field: "size", .. })
        ));
        assert!(matches!(
            TradeEvent::decode(br#"{"sequence": 1, "symbol": "", "price": 1, "size": 1}"#),
            Err(DecodeError::InvalidField { field: "symbol", .. })
        ));
        assert!(matches!(
            TradeEvent::decode(br#"{"sequence": 1.5, "symbol": "X", "price": 1, "size": 1}"#),
            Err(DecodeError::InvalidField { field: "sequence", .. })
        ));
    }

    #[test]
    fn test_decode_large_unsigned_sequence() {
        let payload =
            br#"{"sequence": 18446744073709551615, "symbol": "X", "price": 1, "size": 1}"#;
        let trade = TradeEvent::decode(payload).unwrap();

        assert_eq!(trade.sequence, SequenceId::UInt(u64::MAX));
        assert_eq!(trade.sequence.to_string(), "18446744073709551615");
        assert_eq!(SequenceId::from(u64::MAX), trade.sequence);
        assert_eq!(SequenceId::from(7u64), SequenceId::Int(7));

        let out = serde_json::to_value(&trade).unwrap();
        assert_eq!(out["sequence"], json!(u64::MAX));
    }

    #[test]
    fn test_extra_fields_preserved() {
        let value = json!({
            "sequence": 11,
            "symbol": "TSLA",
            "price": 250,
            "size": 10,
            "exchange": "NASDAQ",
            "anomalies": ["stale"]
        });
        let trade = TradeEvent::from_value(value).unwrap();

        let out = serde_json::to_value(&trade).unwrap();
        assert_eq!(out["exchange"], "NASDAQ");
        assert_eq!(out["price"], 250);
        assert!(out.get(ANOMALIES_FIELD).is_none());
    }
}
