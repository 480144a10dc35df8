//! The create-order saga.
//!
//! A choreography saga with no saga log: progress is implicit in the order
//! status plus the event that just arrived. Each step turns one inbound
//! event into exactly one outbound command, staged in the outbox within a
//! local transaction so a step is either fully recorded or not at all.
//!
//! ```text
//! order created            -> ReserveItems          -> warehouse-commands
//! ItemsReserved            -> AssignCourier         -> courier-commands
//! ItemsReservationFailed   -> CancelOutOfStock      -> order-commands
//! CourierAssigned          -> BeginDelivery         -> order-commands
//! CourierAssignmentFailed  -> ReleaseItems          -> warehouse-commands
//! ItemsReleased            -> CancelCourierNotFound -> order-commands
//! ```

use std::sync::Arc;
use std::time::Instant;

use common::messages::{
    AssignCourier, BeginDelivery, CancelCourierNotFound, CancelOutOfStock, CourierAssigned,
    CourierAssignmentFailed, ItemsReleased, ItemsReservationFailed, ItemsReserved, ReleaseItems,
    ReserveItems,
};
use common::{Clock, MessageId, NamedPayload, Topic};
use domain::{Order, OrderError, OrderStatus, Transaction, UnitOfWork};
use outbox::{OutboxMessage, TopicRoutes};

use crate::error::Result;

/// Destination topics for every command the saga stages in the outbox.
pub fn outbox_routes() -> TopicRoutes {
    TopicRoutes::new()
        .route::<ReserveItems>(Topic::WarehouseCommands)
        .route::<ReleaseItems>(Topic::WarehouseCommands)
        .route::<AssignCourier>(Topic::CourierCommands)
        .route::<CancelOutOfStock>(Topic::OrderCommands)
        .route::<BeginDelivery>(Topic::OrderCommands)
        .route::<CancelCourierNotFound>(Topic::OrderCommands)
}

/// Drives an order from creation to delivery or cancellation.
pub struct CreateOrderSaga<U: UnitOfWork> {
    uow: Arc<U>,
    clock: Arc<dyn Clock>,
}

impl<U: UnitOfWork> CreateOrderSaga<U> {
    pub fn new(uow: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self { uow, clock }
    }

    /// Stores a new order and asks the warehouse to reserve its items.
    ///
    /// The order row and the `ReserveItems` command commit together. On
    /// success `order` carries its stored version.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn create(&self, order: &mut Order) -> Result<MessageId> {
        if order.status() != OrderStatus::Created {
            return Err(OrderError::InvalidStateTransition {
                current_state: order.status(),
                action: "create",
            }
            .into());
        }

        let started = Instant::now();
        let command = ReserveItems {
            order_id: order.id(),
            items: order.reservation_items(),
        };
        let message = OutboxMessage::from_payload(&command, self.clock.now())?;
        let message_id = message.id;

        let mut tx = self.uow.begin().await?;
        tx.create_order(order).await?;
        tx.add_outbox_message(message).await?;
        tx.commit().await?;

        record_step("create", ReserveItems::NAME, started);
        tracing::info!(%message_id, items = command.items.len(), "order created, reserving items");
        Ok(message_id)
    }

    /// Items are reserved: find a courier.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_items_reserved(&self, event: ItemsReserved) -> Result<MessageId> {
        self.emit(
            "items_reserved",
            AssignCourier {
                order_id: event.order_id,
            },
        )
        .await
    }

    /// The warehouse is out of stock: cancel the order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_items_reservation_failed(
        &self,
        event: ItemsReservationFailed,
    ) -> Result<MessageId> {
        self.emit(
            "items_reservation_failed",
            CancelOutOfStock {
                order_id: event.order_id,
            },
        )
        .await
    }

    /// A courier took the order: start the delivery.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, courier_id = %event.courier_id))]
    pub async fn on_courier_assigned(&self, event: CourierAssigned) -> Result<MessageId> {
        self.emit(
            "courier_assigned",
            BeginDelivery {
                order_id: event.order_id,
                courier_id: event.courier_id,
            },
        )
        .await
    }

    /// No courier is available: give the reserved items back.
    ///
    /// The items are re-derived from the stored order, so the release
    /// mirrors exactly what was reserved.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_courier_assignment_failed(
        &self,
        event: CourierAssignmentFailed,
    ) -> Result<MessageId> {
        let started = Instant::now();
        let mut tx = self.uow.begin().await?;
        let order = tx.get_order(event.order_id).await?;

        let command = ReleaseItems {
            order_id: order.id(),
            items: order.reservation_items(),
        };
        let message = OutboxMessage::from_payload(&command, self.clock.now())?;
        let message_id = message.id;
        tx.add_outbox_message(message).await?;
        tx.commit().await?;

        record_step("courier_assignment_failed", ReleaseItems::NAME, started);
        tracing::info!(%message_id, "compensating, releasing reserved items");
        Ok(message_id)
    }

    /// Compensation finished: cancel the order.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_items_released(&self, event: ItemsReleased) -> Result<MessageId> {
        self.emit(
            "items_released",
            CancelCourierNotFound {
                order_id: event.order_id,
            },
        )
        .await
    }

    async fn emit<P: NamedPayload>(&self, step: &'static str, command: P) -> Result<MessageId> {
        let started = Instant::now();
        let message = OutboxMessage::from_payload(&command, self.clock.now())?;
        let message_id = message.id;

        let mut tx = self.uow.begin().await?;
        tx.add_outbox_message(message).await?;
        tx.commit().await?;

        record_step(step, P::NAME, started);
        tracing::info!(%message_id, command = P::NAME, "saga command staged");
        Ok(message_id)
    }
}

fn record_step(step: &'static str, command: &'static str, started: Instant) {
    metrics::counter!("saga_commands_emitted_total", "name" => command).increment(1);
    metrics::histogram!("saga_step_duration_seconds", "step" => step)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::messages::{Item, names};
    use common::{CourierId, CustomerId, ManualClock, OrderId, Version};
    use domain::{InMemoryStore, Money, OrderItem, OrderRepository, RepositoryError};
    use outbox::OutboxRepository;

    use crate::error::SagaError;

    fn saga(store: &InMemoryStore) -> CreateOrderSaga<InMemoryStore> {
        CreateOrderSaga::new(
            Arc::new(store.clone()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn new_order() -> Order {
        Order::new(
            CustomerId::new(),
            "10 Downing Street",
            vec![
                OrderItem::new("SKU-001", Money::from_cents(1200), 3),
                OrderItem::new("SKU-002", Money::from_cents(800), 1),
            ],
            Utc::now(),
        )
        .unwrap()
    }

    async fn staged(store: &InMemoryStore, id: MessageId) -> OutboxMessage {
        store.outbox().get_by_id(id).await.unwrap()
    }

    #[tokio::test]
    async fn create_stores_order_and_reserve_command() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let mut order = new_order();

        let id = saga.create(&mut order).await.unwrap();

        assert_eq!(order.version(), Version::first());
        assert!(store.get_by_id(order.id()).await.is_ok());

        let message = staged(&store, id).await;
        assert_eq!(message.message_type, names::RESERVE_ITEMS);
        let command: ReserveItems = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(command.order_id, order.id());
        assert_eq!(
            command.items,
            vec![Item::new("SKU-001", 3), Item::new("SKU-002", 1)]
        );
    }

    #[tokio::test]
    async fn create_twice_stages_nothing_new() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let mut order = new_order();
        saga.create(&mut order).await.unwrap();

        let mut duplicate = order.clone();
        let result = saga.create(&mut duplicate).await;

        assert!(matches!(
            result,
            Err(SagaError::Repository(RepositoryError::AlreadyExists(_)))
        ));
        assert_eq!(store.outbox().len().await, 1);

        saga.create(&mut new_order()).await.unwrap();
        assert_eq!(store.outbox().len().await, 2);
    }

    #[tokio::test]
    async fn create_requires_created_status() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let mut order = new_order();
        order.cancel_out_of_stock().unwrap();

        let result = saga.create(&mut order).await;

        assert!(matches!(
            result,
            Err(SagaError::Order(OrderError::InvalidStateTransition { .. }))
        ));
        assert_eq!(store.order_count().await, 0);
        assert!(store.outbox().is_empty().await);
    }

    #[tokio::test]
    async fn each_event_stages_exactly_one_command() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let order_id = OrderId::new();
        let courier_id = CourierId::new();

        let cases = [
            (
                saga.on_items_reserved(ItemsReserved { order_id })
                    .await
                    .unwrap(),
                names::ASSIGN_COURIER,
            ),
            (
                saga.on_items_reservation_failed(ItemsReservationFailed { order_id })
                    .await
                    .unwrap(),
                names::CANCEL_OUT_OF_STOCK,
            ),
            (
                saga.on_courier_assigned(CourierAssigned {
                    order_id,
                    courier_id,
                })
                .await
                .unwrap(),
                names::BEGIN_DELIVERY,
            ),
            (
                saga.on_items_released(ItemsReleased { order_id })
                    .await
                    .unwrap(),
                names::CANCEL_COURIER_NOT_FOUND,
            ),
        ];

        assert_eq!(store.outbox().len().await, cases.len());
        for (id, name) in cases {
            let message = staged(&store, id).await;
            assert_eq!(message.message_type, name);
            let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
            assert_eq!(payload["OrderID"], order_id.to_string());
        }
    }

    #[tokio::test]
    async fn begin_delivery_carries_the_courier() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let order_id = OrderId::new();
        let courier_id = CourierId::new();

        let id = saga
            .on_courier_assigned(CourierAssigned {
                order_id,
                courier_id,
            })
            .await
            .unwrap();

        let command: BeginDelivery =
            serde_json::from_slice(&staged(&store, id).await.payload).unwrap();
        assert_eq!(command.courier_id, courier_id);
    }

    #[tokio::test]
    async fn courier_failure_releases_original_items() {
        let store = InMemoryStore::new();
        let saga = saga(&store);
        let mut order = new_order();
        saga.create(&mut order).await.unwrap();

        let id = saga
            .on_courier_assignment_failed(CourierAssignmentFailed {
                order_id: order.id(),
            })
            .await
            .unwrap();

        let message = staged(&store, id).await;
        assert_eq!(message.message_type, names::RELEASE_ITEMS);
        let command: ReleaseItems = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(command.order_id, order.id());
        assert_eq!(command.items, order.reservation_items());
    }

    #[tokio::test]
    async fn courier_failure_for_unknown_order() {
        let store = InMemoryStore::new();
        let saga = saga(&store);

        let result = saga
            .on_courier_assignment_failed(CourierAssignmentFailed {
                order_id: OrderId::new(),
            })
            .await;

        assert!(matches!(
            result,
            Err(SagaError::Repository(RepositoryError::NotFound(_)))
        ));
        assert!(store.outbox().is_empty().await);
    }

    #[test]
    fn routes_cover_every_saga_command() {
        let routes = outbox_routes();

        assert_eq!(
            routes.resolve(names::RESERVE_ITEMS),
            Some(Topic::WarehouseCommands)
        );
        assert_eq!(
            routes.resolve(names::RELEASE_ITEMS),
            Some(Topic::WarehouseCommands)
        );
        assert_eq!(
            routes.resolve(names::ASSIGN_COURIER),
            Some(Topic::CourierCommands)
        );
        for name in [
            names::CANCEL_OUT_OF_STOCK,
            names::BEGIN_DELIVERY,
            names::CANCEL_COURIER_NOT_FOUND,
        ] {
            assert_eq!(routes.resolve(name), Some(Topic::OrderCommands));
        }
        assert_eq!(routes.resolve(names::ITEMS_RESERVED), None);
    }
}
