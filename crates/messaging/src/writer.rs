//! Result writer publishing to a fixed topic.

use std::sync::Arc;

use common::{MessageSet, Topic};

use crate::broker::BrokerWriter;
use crate::envelope::Envelope;
use crate::error::Result;

/// Publishes handler results to one topic, keyed by the envelope id.
pub struct Writer {
    broker: Arc<dyn BrokerWriter>,
    topic: Topic,
}

impl Writer {
    pub fn new(broker: Arc<dyn BrokerWriter>, topic: Topic) -> Self {
        Self { broker, topic }
    }

    /// Returns the destination topic.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Serializes and publishes `envelope`. Does nothing for `None`.
    pub async fn write<R: MessageSet>(&self, envelope: Option<&Envelope<R>>) -> Result<()> {
        let Some(envelope) = envelope else {
            return Ok(());
        };

        let payload = envelope.encode()?;
        let key = envelope.id.to_string();
        self.broker
            .write_message(self.topic.as_str(), key.as_bytes(), payload)
            .await?;

        tracing::debug!(
            topic = %self.topic,
            message_id = %envelope.id,
            name = envelope.name(),
            "result published"
        );
        Ok(())
    }

    /// Closes the underlying broker connection.
    pub async fn close(&self) -> Result<()> {
        self.broker.close().await?;
        Ok(())
    }
}
