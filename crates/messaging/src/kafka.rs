//! Kafka / Redpanda adapter built on rdkafka.

use std::time::Duration;

use async_trait::async_trait;
use common::Topic;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

use crate::broker::{BrokerReader, BrokerWriter};
use crate::error::BrokerError;

/// Connection settings shared by readers and writers.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// Consumer group of every reader created from this config.
    pub group_id: String,
    /// Where a new consumer group starts reading.
    pub auto_offset_reset: String,
    /// Upper bound on a single publish.
    pub message_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            auto_offset_reset: "earliest".to_string(),
            message_timeout: Duration::from_secs(5),
        }
    }
}

/// Consumer subscribed to a fixed set of topics.
///
/// Offsets are committed automatically by the client, so delivery is
/// at-least-once only up to the auto-commit interval.
pub struct KafkaReader {
    consumer: StreamConsumer,
}

impl KafkaReader {
    /// Connects a consumer and subscribes it to `topics`.
    pub fn new(config: &KafkaConfig, topics: &[Topic]) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| BrokerError::Connection(format!("Failed to create consumer: {e}")))?;

        let names: Vec<&str> = topics.iter().map(Topic::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BrokerError::Connection(format!("Failed to subscribe to topics: {e}")))?;

        tracing::info!(topics = ?names, group_id = %config.group_id, "kafka consumer subscribed");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl BrokerReader for KafkaReader {
    async fn read_message(&self) -> Result<Vec<u8>, BrokerError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Receive(e.to_string()))?;

        match message.payload() {
            Some(payload) => Ok(payload.to_vec()),
            None => Err(BrokerError::Receive(format!(
                "empty payload on {} at offset {}",
                message.topic(),
                message.offset()
            ))),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Producer publishing to any topic.
pub struct KafkaWriter {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaWriter {
    /// Creates a producer.
    pub fn new(config: &KafkaConfig) -> Result<Self, BrokerError> {
        let timeout_ms = config.message_timeout.as_millis().to_string();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", &timeout_ms)
            .set("acks", "all")
            .create()
            .map_err(|e| BrokerError::Connection(format!("Failed to create producer: {e}")))?;

        Ok(Self {
            producer,
            timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl BrokerWriter for KafkaWriter {
    async fn write_message(
        &self,
        topic: &str,
        key: &[u8],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(topic, "published to kafka");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.producer
            .flush(Timeout::After(self.timeout))
            .map_err(|e| BrokerError::Connection(format!("Failed to flush producer: {e}")))
    }
}
