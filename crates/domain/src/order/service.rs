//! Order use cases on stored orders.

use std::sync::Arc;

use common::{Clock, CourierId, OrderId};

use crate::error::DomainError;
use crate::repository::{RepositoryError, Transaction, UnitOfWork};

use super::{Order, OrderError};

/// Number of times a mutation is retried after a version conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Service applying status transitions to stored orders.
///
/// Every mutation reads the order in a fresh transaction, applies the
/// transition and writes it conditioned on the version read. Version
/// conflicts are retried with a fresh read; domain errors never are.
pub struct OrderService<U: UnitOfWork> {
    uow: Arc<U>,
    clock: Arc<dyn Clock>,
    conflict_retries: u32,
}

impl<U: UnitOfWork> OrderService<U> {
    /// Creates a new order service.
    pub fn new(uow: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            uow,
            clock,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Sets how many times a conflicting write is retried.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Loads an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let mut tx = self.uow.begin().await?;
        Ok(tx.get_order(order_id).await?)
    }

    /// Cancels an order whose items could not be reserved.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_out_of_stock(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.mutate(order_id, |order| order.cancel_out_of_stock())
            .await
    }

    /// Hands an order to its courier.
    #[tracing::instrument(skip(self))]
    pub async fn begin_delivery(
        &self,
        order_id: OrderId,
        courier_id: CourierId,
    ) -> Result<Order, DomainError> {
        self.mutate(order_id, |order| order.begin_delivery(courier_id))
            .await
    }

    /// Cancels an order for which no courier was found.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_courier_not_found(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.mutate(order_id, |order| order.cancel_courier_not_found())
            .await
    }

    /// Cancels an order on the customer's request.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_by_customer(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.mutate(order_id, |order| order.cancel_by_customer())
            .await
    }

    /// Marks an order delivered now.
    #[tracing::instrument(skip(self))]
    pub async fn complete_delivery(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let clock = Arc::clone(&self.clock);
        self.mutate(order_id, move |order| order.complete_delivery(clock.now()))
            .await
    }

    async fn mutate<F>(&self, order_id: OrderId, transition: F) -> Result<Order, DomainError>
    where
        F: Fn(&mut Order) -> Result<(), OrderError> + Send + Sync,
    {
        let mut retries = 0;
        loop {
            match self.try_mutate(order_id, &transition).await {
                Err(DomainError::Repository(RepositoryError::Conflict { expected, .. }))
                    if retries < self.conflict_retries =>
                {
                    retries += 1;
                    metrics::counter!("order_conflict_retries_total").increment(1);
                    tracing::warn!(%order_id, %expected, retries, "version conflict, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_mutate<F>(&self, order_id: OrderId, transition: &F) -> Result<Order, DomainError>
    where
        F: Fn(&mut Order) -> Result<(), OrderError> + Send + Sync,
    {
        let mut tx = self.uow.begin().await?;
        let mut order = tx.get_order(order_id).await?;
        transition(&mut order)?;
        tx.update_order(&mut order).await?;
        tx.commit().await?;

        tracing::info!(
            %order_id,
            status = %order.status(),
            version = %order.version(),
            "order updated"
        );
        Ok(order)
    }
}
