use async_trait::async_trait;
use common::MessageId;

use crate::{OutboxMessage, Result};

/// Durable storage of pending outbox messages.
///
/// Stand-alone implementations write in their own transaction. Writes that
/// must commit together with an aggregate change go through the owning
/// store's unit of work instead.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Stores a new message.
    async fn create(&self, message: OutboxMessage) -> Result<()>;

    /// Returns every pending message, oldest first.
    async fn get_all(&self) -> Result<Vec<OutboxMessage>>;

    /// Returns one pending message.
    ///
    /// Fails with [`OutboxError::NotFound`](crate::OutboxError::NotFound)
    /// once it has been deleted.
    async fn get_by_id(&self, id: MessageId) -> Result<OutboxMessage>;

    /// Removes a message after it has been published.
    async fn delete(&self, id: MessageId) -> Result<()>;

    /// Counts a failed publish and returns the new attempt count.
    async fn record_failure(&self, id: MessageId) -> Result<u32>;
}
