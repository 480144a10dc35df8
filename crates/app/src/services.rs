//! Wiring of each service role into managed components.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Clock, MessageSet, SystemClock, Topic};
use domain::{InMemoryStore, OrderService, PostgresStore, UnitOfWork};
use messaging::{
    BrokerError, BrokerReader, BrokerWriter, Handler, InMemoryBroker, Processor, Reader, Writer,
};
use outbox::{BrokerPublisher, OutboxProcessor, OutboxRepository, PostgresOutboxRepository};
use participants::{CourierHandler, InMemoryCouriers, InMemoryStock, WarehouseHandler};
use saga::{CreateOrderSaga, OrderCommandHandler, SagaEventHandler, outbox_routes};
use sqlx::postgres::PgPoolOptions;

use crate::config::{Config, ServiceConfig, ServiceRole};
use crate::error::AppError;

/// Hands out broker connections to the pipelines.
pub trait BrokerConnector: Send + Sync {
    /// Opens a reader consuming `topic`.
    fn reader(&self, topic: Topic) -> Result<Arc<dyn BrokerReader>, BrokerError>;

    /// Returns the writer shared by every producer of the process.
    fn writer(&self) -> Arc<dyn BrokerWriter>;
}

impl BrokerConnector for InMemoryBroker {
    fn reader(&self, topic: Topic) -> Result<Arc<dyn BrokerReader>, BrokerError> {
        Ok(Arc::new(InMemoryBroker::reader(self, topic)))
    }

    fn writer(&self) -> Arc<dyn BrokerWriter> {
        Arc::new(self.clone())
    }
}

/// Kafka connections: one consumer per topic, one shared producer.
#[cfg(feature = "kafka")]
pub struct KafkaConnector {
    config: messaging::KafkaConfig,
    writer: Arc<messaging::KafkaWriter>,
}

#[cfg(feature = "kafka")]
impl KafkaConnector {
    pub fn new(config: messaging::KafkaConfig) -> Result<Self, BrokerError> {
        let writer = Arc::new(messaging::KafkaWriter::new(&config)?);
        Ok(Self { config, writer })
    }
}

#[cfg(feature = "kafka")]
impl BrokerConnector for KafkaConnector {
    fn reader(&self, topic: Topic) -> Result<Arc<dyn BrokerReader>, BrokerError> {
        Ok(Arc::new(messaging::KafkaReader::new(&self.config, &[topic])?))
    }

    fn writer(&self) -> Arc<dyn BrokerWriter> {
        self.writer.clone()
    }
}

/// A long-running component with a start/shutdown lifecycle.
#[async_trait]
pub trait Managed: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self) -> Result<(), AppError>;

    async fn shutdown(&self) -> Result<(), AppError>;
}

#[async_trait]
impl<H: Handler> Managed for Processor<H> {
    fn name(&self) -> &'static str {
        Processor::name(self)
    }

    async fn launch(&self) -> Result<(), AppError> {
        Ok(self.start().await?)
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        Ok(self.close().await?)
    }
}

#[async_trait]
impl Managed for OutboxProcessor {
    fn name(&self) -> &'static str {
        "outbox-relay"
    }

    async fn launch(&self) -> Result<(), AppError> {
        Ok(self.start().await?)
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        Ok(self.stop().await?)
    }
}

/// Every component of the running process.
pub struct Services {
    components: Vec<Box<dyn Managed>>,
}

impl Services {
    pub fn new(components: Vec<Box<dyn Managed>>) -> Self {
        Self { components }
    }

    /// Builds the components of the configured role.
    ///
    /// `SERVICE=all` runs every role in this process over the in-memory
    /// broker; the single roles talk to each other through Kafka.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        let service = config.service_config();
        let broker: Box<dyn BrokerConnector> = match service.role {
            ServiceRole::All => Box::new(InMemoryBroker::new()),
            _ => connect_broker(config)?,
        };

        let mut components = Vec::new();
        for role in service.role.roles() {
            components.extend(match role {
                ServiceRole::Order => order_role(config, broker.as_ref(), &service).await?,
                ServiceRole::Warehouse => warehouse_components(broker.as_ref(), &service).await?,
                ServiceRole::Courier => courier_components(broker.as_ref(), &service).await?,
                ServiceRole::All => Vec::new(),
            });
        }

        Ok(Self::new(components))
    }

    /// Names of the components, in start order.
    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Starts every component in order.
    pub async fn start(&self) -> Result<(), AppError> {
        for component in &self.components {
            component.launch().await?;
            tracing::info!(component = component.name(), "component started");
        }
        Ok(())
    }

    /// Shuts every component down in reverse start order.
    ///
    /// Every component is attempted; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut first_error = None;
        for component in self.components.iter().rev() {
            match component.shutdown().await {
                Ok(()) => tracing::info!(component = component.name(), "component stopped"),
                Err(err) => {
                    tracing::error!(component = component.name(), error = %err, "shutdown failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(feature = "kafka")]
fn connect_broker(config: &Config) -> Result<Box<dyn BrokerConnector>, AppError> {
    Ok(Box::new(KafkaConnector::new(config.kafka_config())?))
}

#[cfg(not(feature = "kafka"))]
fn connect_broker(config: &Config) -> Result<Box<dyn BrokerConnector>, AppError> {
    Err(AppError::BrokerUnavailable(config.service))
}

async fn order_role(
    config: &Config,
    broker: &dyn BrokerConnector,
    service: &ServiceConfig,
) -> Result<Vec<Box<dyn Managed>>, AppError> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresStore::new(pool.clone());
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL order store");
            order_components(
                Arc::new(store),
                Arc::new(PostgresOutboxRepository::new(pool)),
                broker,
                service,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            let store = InMemoryStore::new();
            let outbox = Arc::new(store.outbox().clone());
            order_components(Arc::new(store), outbox, broker, service)
        }
    }
}

fn reader<M: MessageSet>(
    broker: &dyn BrokerConnector,
    topic: Topic,
    service: &ServiceConfig,
) -> Result<Reader<M>, AppError> {
    Ok(Reader::with_config(
        topic,
        broker.reader(topic)?,
        service.reader.clone(),
    ))
}

/// Order service: saga on both result topics, its own command topic and
/// the outbox relay.
pub fn order_components<U: UnitOfWork + 'static>(
    uow: Arc<U>,
    outbox: Arc<dyn OutboxRepository>,
    broker: &dyn BrokerConnector,
    service: &ServiceConfig,
) -> Result<Vec<Box<dyn Managed>>, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let saga = Arc::new(CreateOrderSaga::new(Arc::clone(&uow), Arc::clone(&clock)));
    let orders = Arc::new(OrderService::new(uow, Arc::clone(&clock)));

    let saga_events = Processor::new(
        "order-saga",
        SagaEventHandler::new(saga),
        vec![
            reader(broker, Topic::WarehouseCommandResults, service)?,
            reader(broker, Topic::CourierCommandResults, service)?,
        ],
        None,
    );
    let order_commands = Processor::new(
        "order-commands",
        OrderCommandHandler::new(orders),
        vec![reader(broker, Topic::OrderCommands, service)?],
        None,
    );
    let relay = OutboxProcessor::new(
        outbox,
        Arc::new(BrokerPublisher::new(broker.writer(), outbox_routes())),
        clock,
        service.outbox.clone(),
    );

    Ok(vec![
        Box::new(saga_events),
        Box::new(order_commands),
        Box::new(relay),
    ])
}

/// Warehouse service seeded with the configured stock.
pub async fn warehouse_components(
    broker: &dyn BrokerConnector,
    service: &ServiceConfig,
) -> Result<Vec<Box<dyn Managed>>, AppError> {
    let stock = InMemoryStock::new();
    for (product_id, count) in &service.warehouse_stock {
        stock.set_stock(product_id.clone(), *count).await;
    }

    let processor = Processor::new(
        "warehouse",
        WarehouseHandler::new(stock),
        vec![reader(broker, Topic::WarehouseCommands, service)?],
        Some(Writer::new(broker.writer(), Topic::WarehouseCommandResults)),
    );
    Ok(vec![Box::new(processor)])
}

/// Courier service with the configured pool of couriers.
pub async fn courier_components(
    broker: &dyn BrokerConnector,
    service: &ServiceConfig,
) -> Result<Vec<Box<dyn Managed>>, AppError> {
    let couriers = InMemoryCouriers::new();
    for courier_id in &service.couriers {
        couriers.add_courier(*courier_id).await;
    }

    let processor = Processor::new(
        "courier",
        CourierHandler::new(couriers),
        vec![reader(broker, Topic::CourierCommands, service)?],
        Some(Writer::new(broker.writer(), Topic::CourierCommandResults)),
    );
    Ok(vec![Box::new(processor)])
}
