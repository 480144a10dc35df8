//! Order creation entry point.

use std::sync::Arc;

use common::{Clock, CustomerId};
use domain::{Order, OrderItem, UnitOfWork};

use crate::create_order::CreateOrderSaga;
use crate::error::Result;

/// Validates a new order and hands it to the create-order saga.
pub struct CreateOrderUseCase<U: UnitOfWork> {
    saga: Arc<CreateOrderSaga<U>>,
    clock: Arc<dyn Clock>,
}

impl<U: UnitOfWork> CreateOrderUseCase<U> {
    pub fn new(saga: Arc<CreateOrderSaga<U>>, clock: Arc<dyn Clock>) -> Self {
        Self { saga, clock }
    }

    /// Creates the order and starts its saga.
    ///
    /// Validation failures are returned before anything is stored.
    #[tracing::instrument(skip(self, address, items), fields(items = items.len()))]
    pub async fn execute(
        &self,
        customer_id: CustomerId,
        address: impl Into<String> + Send,
        items: Vec<OrderItem>,
    ) -> Result<Order> {
        let mut order = Order::new(customer_id, address, items, self.clock.now())?;
        self.saga.create(&mut order).await?;
        Ok(order)
    }
}
