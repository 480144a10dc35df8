//! Tests for the service wiring over the in-memory broker.

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, SystemClock};
use domain::{InMemoryStore, Money, OrderItem, OrderRepository, OrderStatus};
use messaging::InMemoryBroker;
use saga::{CreateOrderSaga, CreateOrderUseCase};

use app::services::{courier_components, order_components, warehouse_components};
use app::{AppError, Config, ServiceRole, Services};

fn config(vars: &[(&str, &str)]) -> Config {
    Config::from_lookup(|name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
    .unwrap()
}

#[tokio::test]
async fn all_roles_start_and_shut_down() {
    let config = config(&[("SERVICE", "all"), ("OUTBOX_POLL_INTERVAL_MS", "10")]);

    let services = Services::build(&config).await.unwrap();
    assert_eq!(
        services.names(),
        vec![
            "order-saga",
            "order-commands",
            "outbox-relay",
            "warehouse",
            "courier"
        ]
    );

    services.start().await.unwrap();
    services.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let config = config(&[("SERVICE", "all")]);
    let services = Services::build(&config).await.unwrap();

    services.start().await.unwrap();
    assert!(matches!(
        services.start().await,
        Err(AppError::Messaging(_))
    ));
    services.shutdown().await.unwrap();
}

#[cfg(not(feature = "kafka"))]
#[tokio::test]
async fn single_role_needs_kafka() {
    let config = config(&[("SERVICE", "warehouse")]);

    let result = Services::build(&config).await;

    assert!(matches!(
        result,
        Err(AppError::BrokerUnavailable(ServiceRole::Warehouse))
    ));
}

#[tokio::test]
async fn wired_roles_deliver_an_order() {
    let config = config(&[
        ("OUTBOX_POLL_INTERVAL_MS", "10"),
        ("WAREHOUSE_STOCK", "SKU-001=5"),
        ("COURIER_COUNT", "1"),
    ]);
    let service = config.service_config();
    let broker = InMemoryBroker::new();
    let store = InMemoryStore::new();

    let mut components = order_components(
        Arc::new(store.clone()),
        Arc::new(store.outbox().clone()),
        &broker,
        &service,
    )
    .unwrap();
    components.extend(warehouse_components(&broker, &service).await.unwrap());
    components.extend(courier_components(&broker, &service).await.unwrap());
    let services = Services::new(components);
    services.start().await.unwrap();

    let use_case = CreateOrderUseCase::new(
        Arc::new(CreateOrderSaga::new(
            Arc::new(store.clone()),
            Arc::new(SystemClock),
        )),
        Arc::new(SystemClock),
    );
    let order = use_case
        .execute(
            CustomerId::new(),
            "1600 Pennsylvania Avenue",
            vec![OrderItem::new("SKU-001", Money::from_cents(1000), 2)],
        )
        .await
        .unwrap();

    let mut status = OrderStatus::Created;
    for _ in 0..400 {
        status = store.get_by_id(order.id()).await.unwrap().status();
        if status == OrderStatus::Delivering {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    services.shutdown().await.unwrap();

    assert_eq!(status, OrderStatus::Delivering);
    let stored = store.get_by_id(order.id()).await.unwrap();
    assert_eq!(
        stored.delivery().courier_id,
        Some(service.couriers[0])
    );
}
