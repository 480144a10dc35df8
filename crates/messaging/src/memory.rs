//! In-memory broker for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::Topic;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerReader, BrokerWriter};
use crate::error::BrokerError;

/// A message accepted by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

struct TopicQueue {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl TopicQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }
}

#[derive(Default)]
struct BrokerInner {
    topics: Mutex<HashMap<String, TopicQueue>>,
    published: Mutex<Vec<PublishedMessage>>,
    fail_writes: AtomicBool,
}

/// In-memory broker with one unbounded queue per topic.
///
/// Readers of the same topic compete for messages, like members of one
/// consumer group. Every accepted publish is also kept in a history so tests
/// can assert on what was sent.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader consuming `topic`.
    pub fn reader(&self, topic: Topic) -> InMemoryReader {
        let receiver = self.with_queue(topic.as_str(), |queue| Arc::clone(&queue.receiver));
        InMemoryReader {
            topic,
            receiver,
            closed: CancellationToken::new(),
        }
    }

    /// Places raw bytes on `topic` without recording them as published.
    pub fn inject(&self, topic: Topic, payload: Vec<u8>) {
        self.enqueue(topic.as_str(), payload);
    }

    /// Returns every message published to `topic`, oldest first.
    pub fn published(&self, topic: Topic) -> Vec<PublishedMessage> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|message| message.topic == topic.as_str())
            .cloned()
            .collect()
    }

    /// Makes every subsequent publish fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn with_queue<T>(&self, topic: &str, f: impl FnOnce(&TopicQueue) -> T) -> T {
        let mut topics = self
            .inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let queue = topics
            .entry(topic.to_string())
            .or_insert_with(TopicQueue::new);
        f(queue)
    }

    fn enqueue(&self, topic: &str, payload: Vec<u8>) {
        // The queue owns a receiver, so the send cannot fail.
        let _ = self.with_queue(topic, |queue| queue.sender.send(payload));
    }
}

#[async_trait]
impl BrokerWriter for InMemoryBroker {
    async fn write_message(
        &self,
        topic: &str,
        key: &[u8],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_vec(),
                payload: payload.clone(),
            });
        self.enqueue(topic, payload);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Reader over one topic of an [`InMemoryBroker`].
pub struct InMemoryReader {
    topic: Topic,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    closed: CancellationToken,
}

impl InMemoryReader {
    /// Returns the topic this reader consumes.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[async_trait]
impl BrokerReader for InMemoryReader {
    async fn read_message(&self) -> Result<Vec<u8>, BrokerError> {
        tokio::select! {
            _ = self.closed.cancelled() => Err(BrokerError::Closed),
            message = async { self.receiver.lock().await.recv().await } => {
                message.ok_or(BrokerError::Closed)
            }
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn published_message_reaches_reader() {
        let broker = InMemoryBroker::new();
        let reader = broker.reader(Topic::WarehouseCommands);

        broker
            .write_message("warehouse-commands", b"key", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(reader.read_message().await.unwrap(), b"hello".to_vec());
        let published = broker.published(Topic::WarehouseCommands);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, b"key".to_vec());
        assert!(broker.published(Topic::CourierCommands).is_empty());
    }

    #[tokio::test]
    async fn injected_messages_are_not_recorded() {
        let broker = InMemoryBroker::new();
        let reader = broker.reader(Topic::OrderCommands);

        broker.inject(Topic::OrderCommands, b"raw".to_vec());

        assert_eq!(reader.read_message().await.unwrap(), b"raw".to_vec());
        assert!(broker.published(Topic::OrderCommands).is_empty());
    }

    #[tokio::test]
    async fn failing_writes_are_rejected() {
        let broker = InMemoryBroker::new();
        broker.set_fail_writes(true);

        let err = broker
            .write_message("courier-commands", b"k", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Publish { .. }));
        assert!(broker.published(Topic::CourierCommands).is_empty());

        broker.set_fail_writes(false);
        broker
            .write_message("courier-commands", b"k", vec![])
            .await
            .unwrap();
        assert_eq!(broker.published(Topic::CourierCommands).len(), 1);
    }

    #[tokio::test]
    async fn close_unblocks_pending_read() {
        let broker = InMemoryBroker::new();
        let reader = Arc::new(broker.reader(Topic::ProductEvents));

        let pending = {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move { reader.read_message().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        reader.close().await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn readers_of_one_topic_share_messages() {
        let broker = InMemoryBroker::new();
        let first = broker.reader(Topic::CourierCommandResults);
        let second = broker.reader(Topic::CourierCommandResults);

        broker.inject(Topic::CourierCommandResults, b"a".to_vec());
        broker.inject(Topic::CourierCommandResults, b"b".to_vec());

        assert_eq!(first.read_message().await.unwrap(), b"a".to_vec());
        assert_eq!(second.read_message().await.unwrap(), b"b".to_vec());
    }
}
