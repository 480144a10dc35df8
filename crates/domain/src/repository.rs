//! Order persistence with optimistic concurrency.
//!
//! Writes go through a [`UnitOfWork`]: a transaction that can read and write
//! orders and stage outbox messages, all committed atomically. The
//! [`OrderRepository`] convenience API is implemented for every unit of
//! work, one transaction per call.

use async_trait::async_trait;
use common::{OrderId, Version};
use outbox::{OutboxError, OutboxMessage};
use thiserror::Error;

use crate::order::Order;

/// Errors that can occur when loading or storing orders.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No order has this id.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The stored version moved since the order was read.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}")]
    Conflict { order_id: OrderId, expected: Version },

    /// A stored row could not be mapped back to an order.
    #[error("Corrupt order {order_id}: {reason}")]
    Corrupt { order_id: OrderId, reason: String },

    /// Staging an outbox message failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// One local transaction over orders and the outbox.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit)
/// discards every staged write.
#[async_trait]
pub trait Transaction: Send {
    /// Loads an order, seeing this transaction's own writes.
    async fn get_order(&mut self, id: OrderId) -> Result<Order>;

    /// Inserts a new order and sets its version to `Version::first()`.
    async fn create_order(&mut self, order: &mut Order) -> Result<()>;

    /// Writes `order` if the stored version still equals `order.version()`,
    /// then moves the order to the next version.
    ///
    /// Fails with [`RepositoryError::Conflict`] when another writer got
    /// there first.
    async fn update_order(&mut self, order: &mut Order) -> Result<()>;

    /// Stages an outbox message in this transaction.
    async fn add_outbox_message(&mut self, message: OutboxMessage) -> Result<()>;

    /// Commits every staged write atomically.
    async fn commit(self) -> Result<()>;
}

/// Factory of [`Transaction`]s.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Transaction: Transaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// Single-operation access to orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Loads an order.
    async fn get_by_id(&self, id: OrderId) -> Result<Order>;

    /// Inserts a new order at `Version::first()`.
    async fn create(&self, order: &mut Order) -> Result<()>;

    /// Writes an order conditioned on its current version.
    async fn update(&self, order: &mut Order) -> Result<()>;
}

#[async_trait]
impl<U: UnitOfWork> OrderRepository for U {
    async fn get_by_id(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.begin().await?;
        tx.get_order(id).await
    }

    async fn create(&self, order: &mut Order) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.create_order(order).await?;
        tx.commit().await
    }

    async fn update(&self, order: &mut Order) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.update_order(order).await?;
        tx.commit().await
    }
}
