//! NATS message producer for detected anomalies

use crate::config::ProducerConfig;
use crate::error::PublishError;
use crate::sink::AnomalySink;
use crate::types::AnomalyResult;
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the message key. JetStream also uses it to drop re-published
/// duplicates.
pub const MESSAGE_KEY_HEADER: &str = "Nats-Msg-Id";

/// Producer for publishing anomalies to NATS
#[derive(Clone)]
pub struct AnomalyProducer {
    client: Client,
    subject: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AnomalyProducer {
    /// Create a new anomaly producer
    pub fn new(client: Client, subject: &str, config: &ProducerConfig) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Flush buffered messages to the server
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.client.flush().await?;
        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Delay before retry number `retry` (1-based): the base delay doubled each time.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
}

#[async_trait]
impl AnomalySink for AnomalyProducer {
    async fn publish(&self, anomaly: &AnomalyResult) -> Result<(), PublishError> {
        let key = anomaly.key();
        let payload = serde_json::to_vec(anomaly).map_err(|source| PublishError::Serialize {
            key: key.clone(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_KEY_HEADER, key.as_str());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .client
                .publish_with_headers(self.subject.clone(), headers.clone(), payload.clone().into())
                .await
            {
                Ok(()) => {
                    debug!(
                        key = %key,
                        subject = %self.subject,
                        attempt = attempt,
                        "Published anomaly"
                    );
                    return Ok(());
                }
                Err(e) if attempt <= self.max_retries => {
                    let delay = backoff_delay(self.retry_backoff, attempt);
                    warn!(
                        key = %key,
                        attempt = attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(PublishError::Transport {
                        key,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(50);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(50));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(400));
    }

    // Publishing requires a running NATS server
}
