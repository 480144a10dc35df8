//! PostgreSQL integration tests for the order store.
//!
//! These tests use a shared PostgreSQL container.
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::messages::ReserveItems;
use common::{CourierId, CustomerId, OrderId, SystemClock, Version};
use domain::{
    DomainError, Money, Order, OrderError, OrderItem, OrderRepository, OrderService, OrderStatus,
    PostgresStore, RepositoryError, Transaction, UnitOfWork,
};
use outbox::{OutboxMessage, OutboxRepository, PostgresOutboxRepository};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_outbox_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, outbox_messages")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn new_order() -> Order {
    Order::new(
        CustomerId::new(),
        "221B Baker Street",
        vec![
            OrderItem::new("SKU-001", Money::from_cents(1999), 2),
            OrderItem::new("SKU-002", Money::from_cents(500), 1),
        ],
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn test_create_and_load_order() {
    let store = get_test_store().await;
    let mut order = new_order();

    store.create(&mut order).await.unwrap();
    assert_eq!(order.version(), Version::first());

    let loaded = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(loaded.id(), order.id());
    assert_eq!(loaded.customer_id(), order.customer_id());
    assert_eq!(loaded.status(), OrderStatus::Created);
    assert_eq!(loaded.version(), Version::first());
    assert_eq!(loaded.items(), order.items());
    assert_eq!(loaded.delivery().address, "221B Baker Street");
    assert!(loaded.delivery().courier_id.is_none());
}

#[tokio::test]
#[serial]
async fn test_large_item_count_round_trips() {
    let store = get_test_store().await;
    let mut order = Order::new(
        CustomerId::new(),
        "221B Baker Street",
        vec![OrderItem::new("SKU-001", Money::from_cents(1), u32::MAX)],
        Utc::now(),
    )
    .unwrap();

    store.create(&mut order).await.unwrap();

    let loaded = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(loaded.items()[0].count, u32::MAX);
}

#[tokio::test]
#[serial]
async fn test_out_of_range_item_count_is_corrupt() {
    let store = get_test_store().await;
    let mut order = new_order();
    store.create(&mut order).await.unwrap();

    sqlx::query("UPDATE order_items SET count = $1 WHERE order_id = $2")
        .bind(i64::from(u32::MAX) + 1)
        .bind(order.id().as_uuid())
        .execute(store.pool())
        .await
        .unwrap();

    assert!(matches!(
        store.get_by_id(order.id()).await,
        Err(RepositoryError::Corrupt { order_id, .. }) if order_id == order.id()
    ));
}

#[tokio::test]
#[serial]
async fn test_load_missing_order() {
    let store = get_test_store().await;
    let id = OrderId::new();

    assert!(matches!(
        store.get_by_id(id).await,
        Err(RepositoryError::NotFound(missing)) if missing == id
    ));
}

#[tokio::test]
#[serial]
async fn test_create_twice_fails() {
    let store = get_test_store().await;
    let mut order = new_order();
    store.create(&mut order).await.unwrap();

    let mut again = order.clone();
    assert!(matches!(
        store.create(&mut again).await,
        Err(RepositoryError::AlreadyExists(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_update_persists_transition() {
    let store = get_test_store().await;
    let mut order = new_order();
    store.create(&mut order).await.unwrap();
    let courier_id = CourierId::new();

    order.begin_delivery(courier_id).unwrap();
    store.update(&mut order).await.unwrap();
    assert_eq!(order.version(), Version::new(2));

    let loaded = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(loaded.status(), OrderStatus::Delivering);
    assert_eq!(loaded.delivery().courier_id, Some(courier_id));
    assert_eq!(loaded.version(), Version::new(2));
}

#[tokio::test]
#[serial]
async fn test_stale_update_conflicts() {
    let store = get_test_store().await;
    let mut order = new_order();
    store.create(&mut order).await.unwrap();

    let mut first = store.get_by_id(order.id()).await.unwrap();
    let mut second = store.get_by_id(order.id()).await.unwrap();

    first.begin_delivery(CourierId::new()).unwrap();
    store.update(&mut first).await.unwrap();

    second.cancel_out_of_stock().unwrap();
    let result = store.update(&mut second).await;

    assert!(matches!(result, Err(RepositoryError::Conflict { .. })));
    assert_eq!(second.version(), Version::first());

    let stored = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Delivering);
    assert_eq!(stored.version(), Version::new(2));
}

#[tokio::test]
#[serial]
async fn test_concurrent_updates_exactly_one_wins() {
    let store = get_test_store().await;
    let mut order = new_order();
    store.create(&mut order).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..2 {
        let store = store.clone();
        let mut copy = order.clone();
        handles.push(tokio::spawn(async move {
            if i == 0 {
                copy.cancel_out_of_stock().unwrap();
            } else {
                copy.begin_delivery(CourierId::new()).unwrap();
            }
            store.update(&mut copy).await.map(|_| copy)
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => winners.push(order),
            Err(RepositoryError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);
    let stored = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(stored.version(), Version::new(2));
    assert_eq!(stored.status(), winners[0].status());
}

#[tokio::test]
#[serial]
async fn test_outbox_message_commits_with_order() {
    let store = get_test_store().await;
    let outbox = PostgresOutboxRepository::new(store.pool().clone());
    let mut order = new_order();
    let message = OutboxMessage::from_payload(
        &ReserveItems {
            order_id: order.id(),
            items: order.reservation_items(),
        },
        Utc::now(),
    )
    .unwrap();
    let message_id = message.id;

    let mut tx = store.begin().await.unwrap();
    tx.create_order(&mut order).await.unwrap();
    tx.add_outbox_message(message).await.unwrap();
    tx.commit().await.unwrap();

    let stored = outbox.get_by_id(message_id).await.unwrap();
    assert_eq!(stored.message_type, "create_order.reserve_items");
    assert!(store.get_by_id(order.id()).await.is_ok());
}

#[tokio::test]
#[serial]
async fn test_dropped_transaction_rolls_back_order_and_outbox() {
    let store = get_test_store().await;
    let outbox = PostgresOutboxRepository::new(store.pool().clone());
    let mut order = new_order();
    let message = OutboxMessage::from_payload(
        &ReserveItems {
            order_id: order.id(),
            items: order.reservation_items(),
        },
        Utc::now(),
    )
    .unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        tx.create_order(&mut order).await.unwrap();
        tx.add_outbox_message(message).await.unwrap();
    }

    assert!(matches!(
        store.get_by_id(order.id()).await,
        Err(RepositoryError::NotFound(_))
    ));
    assert!(outbox.get_all().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_service_completes_delivery() {
    let store = get_test_store().await;
    let service = OrderService::new(Arc::new(store.clone()), Arc::new(SystemClock));
    let mut order = new_order();
    store.create(&mut order).await.unwrap();

    let result = service.complete_delivery(order.id()).await;
    assert!(matches!(
        result,
        Err(DomainError::Order(OrderError::InvalidStateTransition { .. }))
    ));

    service
        .begin_delivery(order.id(), CourierId::new())
        .await
        .unwrap();
    let delivered = service.complete_delivery(order.id()).await.unwrap();

    let arrived = delivered.delivery().arrived.unwrap();
    assert!((Utc::now() - arrived).num_milliseconds().abs() < 1000);

    let stored = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Delivered);
    assert!(stored.delivery().arrived.is_some());
}
