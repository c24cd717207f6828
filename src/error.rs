//! Error types for the anomaly detection pipeline

use thiserror::Error;

/// A payload that could not be turned into a [`TradeEvent`](crate::types::TradeEvent).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// The downstream sink could not accept an anomaly.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize anomaly {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish anomaly {key} after {attempts} attempt(s): {reason}")]
    Transport {
        key: String,
        attempts: u32,
        reason: String,
    },
}

impl PublishError {
    /// Message key of the anomaly that was lost.
    pub fn key(&self) -> &str {
        match self {
            PublishError::Serialize { key, .. } | PublishError::Transport { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_key() {
        let err = PublishError::Transport {
            key: "42".to_string(),
            attempts: 3,
            reason: "no responders".to_string(),
        };

        assert_eq!(err.key(), "42");
        assert_eq!(
            err.to_string(),
            "failed to publish anomaly 42 after 3 attempt(s): no responders"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::invalid("price", "must be positive, got -1");
        assert_eq!(err.to_string(), "invalid field price: must be positive, got -1");
    }
}
