//! NATS JetStream consumer for incoming trades

use crate::config::{NatsConfig, OffsetReset};
use anyhow::{Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy},
    stream,
};
use async_nats::Client;
use tracing::info;

/// Consumer for receiving trades from a JetStream stream
pub struct TradeConsumer {
    context: jetstream::Context,
    subject: String,
    stream: String,
    group: String,
    offset_reset: OffsetReset,
    auto_create: bool,
}

impl TradeConsumer {
    /// Create a new trade consumer
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            context: jetstream::new(client),
            subject: config.input_subject.clone(),
            stream: config.stream.clone(),
            group: config.consumer_group.clone(),
            offset_reset: config.auto_offset_reset,
            auto_create: config.auto_create_topics,
        }
    }

    /// Bind the durable consumer and start pulling messages
    pub async fn subscribe(&self) -> Result<pull::Stream> {
        let stream = if self.auto_create {
            self.context
                .get_or_create_stream(stream::Config {
                    name: self.stream.clone(),
                    subjects: vec![self.subject.clone()],
                    ..Default::default()
                })
                .await
                .with_context(|| format!("Failed to create stream {}", self.stream))?
        } else {
            self.context
                .get_stream(&self.stream)
                .await
                .with_context(|| format!("Stream {} not found", self.stream))?
        };

        let consumer = stream
            .get_or_create_consumer(&self.group, self.consumer_config())
            .await
            .with_context(|| format!("Failed to bind consumer {}", self.group))?;

        let messages = consumer
            .messages()
            .await
            .context("Failed to start message stream")?;

        info!(
            stream = %self.stream,
            subject = %self.subject,
            consumer_group = %self.group,
            offset_reset = ?self.offset_reset,
            "Subscribed to trade stream"
        );
        Ok(messages)
    }

    fn consumer_config(&self) -> pull::Config {
        pull::Config {
            durable_name: Some(self.group.clone()),
            deliver_policy: deliver_policy(self.offset_reset),
            ack_policy: AckPolicy::Explicit,
            filter_subject: self.subject.clone(),
            ..Default::default()
        }
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

fn deliver_policy(offset_reset: OffsetReset) -> DeliverPolicy {
    match offset_reset {
        OffsetReset::Earliest => DeliverPolicy::All,
        OffsetReset::Latest => DeliverPolicy::New,
    }
}
