use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Version};
use outbox::{InMemoryOutboxRepository, OutboxMessage};
use tokio::sync::RwLock;

use crate::order::Order;
use crate::repository::{RepositoryError, Result, Transaction, UnitOfWork};

/// In-memory order store for testing and single-process deployments.
///
/// Shares an [`InMemoryOutboxRepository`] with the outbox processor; a
/// commit writes orders and outbox messages under both locks, so either
/// all staged writes land or none do.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    outbox: InMemoryOutboxRepository,
}

impl InMemoryStore {
    /// Creates an empty store with its own outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store writing to `outbox`.
    pub fn with_outbox(outbox: InMemoryOutboxRepository) -> Self {
        Self {
            orders: Arc::default(),
            outbox,
        }
    }

    /// Returns the outbox this store writes to.
    pub fn outbox(&self) -> &InMemoryOutboxRepository {
        &self.outbox
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            writes: Vec::new(),
            messages: Vec::new(),
        })
    }
}

enum StagedWrite {
    Create(Order),
    Update { order: Order, expected: Version },
}

impl StagedWrite {
    fn order(&self) -> &Order {
        match self {
            StagedWrite::Create(order) | StagedWrite::Update { order, .. } => order,
        }
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Writes are staged and validated again against the committed state at
/// commit time.
pub struct InMemoryTransaction {
    store: InMemoryStore,
    writes: Vec<StagedWrite>,
    messages: Vec<OutboxMessage>,
}

impl InMemoryTransaction {
    fn staged(&self, id: OrderId) -> Option<&Order> {
        self.writes
            .iter()
            .rev()
            .map(StagedWrite::order)
            .find(|order| order.id() == id)
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_order(&mut self, id: OrderId) -> Result<Order> {
        if let Some(order) = self.staged(id) {
            return Ok(order.clone());
        }
        self.store
            .orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn create_order(&mut self, order: &mut Order) -> Result<()> {
        let id = order.id();
        if self.staged(id).is_some() || self.store.orders.read().await.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists(id));
        }

        order.set_version(Version::first());
        self.writes.push(StagedWrite::Create(order.clone()));
        Ok(())
    }

    async fn update_order(&mut self, order: &mut Order) -> Result<()> {
        let id = order.id();
        let expected = order.version();

        let current = match self.staged(id) {
            Some(staged) => Some(staged.version()),
            None => self.store.orders.read().await.get(&id).map(Order::version),
        };
        match current {
            None => return Err(RepositoryError::NotFound(id)),
            Some(version) if version != expected => {
                return Err(RepositoryError::Conflict {
                    order_id: id,
                    expected,
                });
            }
            Some(_) => {}
        }

        order.set_version(expected.next());
        self.writes.push(StagedWrite::Update {
            order: order.clone(),
            expected,
        });
        Ok(())
    }

    async fn add_outbox_message(&mut self, message: OutboxMessage) -> Result<()> {
        self.messages.push(message);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut orders = self.store.orders.write().await;

        // Versions as they will be after each staged write, checked in order.
        let mut pending: HashMap<OrderId, Version> = HashMap::new();
        for write in &self.writes {
            let order = write.order();
            let id = order.id();
            let current = pending
                .get(&id)
                .copied()
                .or_else(|| orders.get(&id).map(Order::version));

            match (write, current) {
                (StagedWrite::Create(_), Some(_)) => {
                    return Err(RepositoryError::AlreadyExists(id));
                }
                (StagedWrite::Update { .. }, None) => return Err(RepositoryError::NotFound(id)),
                (StagedWrite::Update { expected, .. }, Some(version)) if version != *expected => {
                    return Err(RepositoryError::Conflict {
                        order_id: id,
                        expected: *expected,
                    });
                }
                _ => {}
            }
            pending.insert(id, order.version());
        }

        // Lock order: orders, then outbox.
        self.store.outbox.create_all(self.messages).await?;

        for write in self.writes {
            let order = match write {
                StagedWrite::Create(order) | StagedWrite::Update { order, .. } => order,
            };
            orders.insert(order.id(), order);
        }
        Ok(())
    }
}
