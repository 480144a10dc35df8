//! Pipeline handlers of the order service.

use std::sync::Arc;

use async_trait::async_trait;
use common::messages::{OrderCommand, SagaEvent};
use domain::{DomainError, OrderService, UnitOfWork};
use messaging::{Envelope, Handler, NoReply};

use crate::create_order::CreateOrderSaga;
use crate::error::SagaError;

/// Feeds warehouse and courier results into the create-order saga.
///
/// Replies are never published directly: every outbound command goes
/// through the outbox.
pub struct SagaEventHandler<U: UnitOfWork> {
    saga: Arc<CreateOrderSaga<U>>,
}

impl<U: UnitOfWork> SagaEventHandler<U> {
    pub fn new(saga: Arc<CreateOrderSaga<U>>) -> Self {
        Self { saga }
    }
}

#[async_trait]
impl<U: UnitOfWork + 'static> Handler for SagaEventHandler<U> {
    type Message = SagaEvent;
    type Output = NoReply;
    type Error = SagaError;

    async fn handle(
        &self,
        envelope: Envelope<SagaEvent>,
    ) -> Result<Option<Envelope<NoReply>>, SagaError> {
        tracing::debug!(message_id = %envelope.id, name = envelope.name(), "saga event received");

        match envelope.message {
            SagaEvent::ItemsReserved(event) => self.saga.on_items_reserved(event).await?,
            SagaEvent::ItemsReservationFailed(event) => {
                self.saga.on_items_reservation_failed(event).await?
            }
            SagaEvent::ItemsReleased(event) => self.saga.on_items_released(event).await?,
            SagaEvent::CourierAssigned(event) => self.saga.on_courier_assigned(event).await?,
            SagaEvent::CourierAssignmentFailed(event) => {
                self.saga.on_courier_assignment_failed(event).await?
            }
        };
        Ok(None)
    }
}

/// Applies the commands the saga sends to the order service itself.
pub struct OrderCommandHandler<U: UnitOfWork> {
    orders: Arc<OrderService<U>>,
}

impl<U: UnitOfWork> OrderCommandHandler<U> {
    pub fn new(orders: Arc<OrderService<U>>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl<U: UnitOfWork + 'static> Handler for OrderCommandHandler<U> {
    type Message = OrderCommand;
    type Output = NoReply;
    type Error = DomainError;

    async fn handle(
        &self,
        envelope: Envelope<OrderCommand>,
    ) -> Result<Option<Envelope<NoReply>>, DomainError> {
        let order = match envelope.message {
            OrderCommand::CancelOutOfStock(command) => {
                self.orders.cancel_out_of_stock(command.order_id).await?
            }
            OrderCommand::BeginDelivery(command) => {
                self.orders
                    .begin_delivery(command.order_id, command.courier_id)
                    .await?
            }
            OrderCommand::CancelCourierNotFound(command) => {
                self.orders.cancel_courier_not_found(command.order_id).await?
            }
        };

        tracing::info!(
            message_id = %envelope.id,
            order_id = %order.id(),
            status = %order.status(),
            "order command applied"
        );
        Ok(None)
    }
}
