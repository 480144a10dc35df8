use std::sync::Arc;

use async_trait::async_trait;
use common::MessageId;
use tokio::sync::RwLock;

use crate::{OutboxError, OutboxMessage, OutboxRepository, Result};

/// In-memory outbox for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOutboxRepository {
    messages: Arc<RwLock<Vec<OutboxMessage>>>,
}

impl InMemoryOutboxRepository {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of pending messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Returns `true` when nothing is pending.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Stores every message or none of them.
    pub async fn create_all(&self, messages: Vec<OutboxMessage>) -> Result<()> {
        let mut stored = self.messages.write().await;

        for (index, message) in messages.iter().enumerate() {
            let clashes_stored = stored.iter().any(|m| m.id == message.id);
            let clashes_batch = messages[..index].iter().any(|m| m.id == message.id);
            if clashes_stored || clashes_batch {
                return Err(OutboxError::Duplicate(message.id));
            }
        }

        stored.extend(messages);
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn create(&self, message: OutboxMessage) -> Result<()> {
        self.create_all(vec![message]).await
    }

    async fn get_all(&self) -> Result<Vec<OutboxMessage>> {
        let mut messages = self.messages.read().await.clone();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn get_by_id(&self, id: MessageId) -> Result<OutboxMessage> {
        self.messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(OutboxError::NotFound(id))
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(OutboxError::NotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: MessageId) -> Result<u32> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(OutboxError::NotFound(id))?;
        message.attempts += 1;
        Ok(message.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::OrderId;
    use common::messages::AssignCourier;

    fn message() -> OutboxMessage {
        OutboxMessage::from_payload(
            &AssignCourier {
                order_id: OrderId::new(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn created_message_is_listed_until_deleted() {
        let repo = InMemoryOutboxRepository::new();
        let message = message();
        let id = message.id;

        repo.create(message.clone()).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap(), vec![message.clone()]);
        assert_eq!(repo.get_by_id(id).await.unwrap(), message);

        repo.delete(id).await.unwrap();
        assert!(repo.get_all().await.unwrap().is_empty());
        assert!(matches!(
            repo.get_by_id(id).await,
            Err(OutboxError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn get_all_is_oldest_first() {
        let repo = InMemoryOutboxRepository::new();
        let mut newer = message();
        let mut older = message();
        newer.created_at = Utc::now();
        older.created_at = newer.created_at - Duration::seconds(5);

        repo.create(newer.clone()).await.unwrap();
        repo.create(older.clone()).await.unwrap();

        let ids: Vec<_> = repo.get_all().await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let repo = InMemoryOutboxRepository::new();
        let message = message();

        repo.create(message.clone()).await.unwrap();
        assert!(matches!(
            repo.create(message).await,
            Err(OutboxError::Duplicate(_))
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn create_all_is_all_or_nothing() {
        let repo = InMemoryOutboxRepository::new();
        let first = message();

        let result = repo.create_all(vec![first.clone(), first]).await;

        assert!(matches!(result, Err(OutboxError::Duplicate(_))));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn record_failure_counts_attempts() {
        let repo = InMemoryOutboxRepository::new();
        let message = message();
        let id = message.id;
        repo.create(message).await.unwrap();

        assert_eq!(repo.record_failure(id).await.unwrap(), 1);
        assert_eq!(repo.record_failure(id).await.unwrap(), 2);
        assert_eq!(repo.get_by_id(id).await.unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn missing_message_operations_fail() {
        let repo = InMemoryOutboxRepository::new();
        let id = MessageId::new();

        assert!(matches!(repo.delete(id).await, Err(OutboxError::NotFound(_))));
        assert!(matches!(
            repo.record_failure(id).await,
            Err(OutboxError::NotFound(_))
        ));
    }
}
