//! Service configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use common::{CourierId, ProductId};
use messaging::ReaderConfig;
use outbox::OutboxConfig;
use thiserror::Error;

/// A variable was set to a value that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid value for {name}: {value:?} ({reason})")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Order service: create-order saga, order commands and the outbox relay.
    Order,
    Warehouse,
    Courier,
    /// Every role in one process over the in-memory broker.
    All,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Order => "order",
            ServiceRole::Warehouse => "warehouse",
            ServiceRole::Courier => "courier",
            ServiceRole::All => "all",
        }
    }

    /// The single roles this selection runs.
    pub fn roles(&self) -> &'static [ServiceRole] {
        match self {
            ServiceRole::Order => &[ServiceRole::Order],
            ServiceRole::Warehouse => &[ServiceRole::Warehouse],
            ServiceRole::Courier => &[ServiceRole::Courier],
            ServiceRole::All => &[
                ServiceRole::Order,
                ServiceRole::Warehouse,
                ServiceRole::Courier,
            ],
        }
    }
}

impl FromStr for ServiceRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "order" => Ok(ServiceRole::Order),
            "warehouse" => Ok(ServiceRole::Warehouse),
            "courier" => Ok(ServiceRole::Courier),
            "all" => Ok(ServiceRole::All),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process configuration with defaults.
///
/// Reads from environment variables:
/// - `SERVICE`: `order`, `warehouse`, `courier` or `all` (default: `"order"`)
/// - `KAFKA_BROKERS`: bootstrap servers (default: `"localhost:9092"`)
/// - `KAFKA_GROUP_ID`: consumer group (default: `"<service>-service"`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `OUTBOX_POLL_INTERVAL_MS`: outbox poll delay (default: `1000`)
/// - `OUTBOX_MAX_ATTEMPTS`: failed publishes before a message is parked
///   (default: unlimited)
/// - `METRICS_ADDR`: Prometheus listener (default: `"0.0.0.0:9000"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `"text"`)
/// - `WAREHOUSE_STOCK`: initial stock as `SKU=count,...` (default: empty)
/// - `COURIER_COUNT`: couriers available at start (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceRole,
    pub kafka_brokers: String,
    pub kafka_group_id: String,
    pub database_url: Option<String>,
    pub outbox_poll_interval: Duration,
    pub outbox_max_attempts: Option<u32>,
    pub metrics_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub warehouse_stock: Vec<(ProductId, u32)>,
    pub courier_count: usize,
}

/// Settings of one service's pipeline.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub role: ServiceRole,
    pub outbox: OutboxConfig,
    pub reader: ReaderConfig,
    pub warehouse_stock: Vec<(ProductId, u32)>,
    pub couriers: Vec<CourierId>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let service = match var("SERVICE") {
            Some(value) => ServiceRole::from_str(&value).map_err(|()| ConfigError {
                name: "SERVICE",
                value,
                reason: "expected order, warehouse, courier or all",
            })?,
            None => defaults.service,
        };

        let outbox_poll_interval = match var("OUTBOX_POLL_INTERVAL_MS") {
            Some(value) => Duration::from_millis(parse("OUTBOX_POLL_INTERVAL_MS", value)?),
            None => defaults.outbox_poll_interval,
        };

        let log_format = match var("LOG_FORMAT") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError {
                        name: "LOG_FORMAT",
                        value,
                        reason: "expected text or json",
                    });
                }
            },
            None => defaults.log_format,
        };

        Ok(Self {
            service,
            kafka_brokers: var("KAFKA_BROKERS").unwrap_or(defaults.kafka_brokers),
            kafka_group_id: var("KAFKA_GROUP_ID").unwrap_or_else(|| format!("{service}-service")),
            database_url: var("DATABASE_URL"),
            outbox_poll_interval,
            outbox_max_attempts: var("OUTBOX_MAX_ATTEMPTS")
                .map(|value| parse("OUTBOX_MAX_ATTEMPTS", value))
                .transpose()?,
            metrics_addr: match var("METRICS_ADDR") {
                Some(value) => parse("METRICS_ADDR", value)?,
                None => defaults.metrics_addr,
            },
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            warehouse_stock: match var("WAREHOUSE_STOCK") {
                Some(value) => parse_stock(value)?,
                None => defaults.warehouse_stock,
            },
            courier_count: match var("COURIER_COUNT") {
                Some(value) => parse("COURIER_COUNT", value)?,
                None => defaults.courier_count,
            },
        })
    }

    /// Returns the pipeline settings of the configured role.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            role: self.service,
            outbox: OutboxConfig {
                poll_interval: self.outbox_poll_interval,
                max_attempts: self.outbox_max_attempts,
            },
            reader: ReaderConfig::default(),
            warehouse_stock: self.warehouse_stock.clone(),
            couriers: (0..self.courier_count).map(|_| CourierId::new()).collect(),
        }
    }

    #[cfg(feature = "kafka")]
    pub fn kafka_config(&self) -> messaging::KafkaConfig {
        messaging::KafkaConfig::new(&self.kafka_brokers, &self.kafka_group_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceRole::Order,
            kafka_brokers: "localhost:9092".to_string(),
            kafka_group_id: "order-service".to_string(),
            database_url: None,
            outbox_poll_interval: Duration::from_secs(1),
            outbox_max_attempts: None,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            warehouse_stock: Vec::new(),
            courier_count: 3,
        }
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError {
        name,
        value,
        reason: "not a valid value",
    })
}

fn parse_stock(value: String) -> Result<Vec<(ProductId, u32)>, ConfigError> {
    let invalid = |reason: &'static str| ConfigError {
        name: "WAREHOUSE_STOCK",
        value: value.clone(),
        reason,
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(ProductId, u32), ConfigError> {
            let (sku, count) = entry
                .split_once('=')
                .ok_or_else(|| invalid("expected SKU=count"))?;
            let count = count
                .trim()
                .parse()
                .map_err(|_| invalid("count is not a number"))?;
            Ok((ProductId::new(sku.trim()), count))
        })
        .collect()
}
