//! Service process for the order fulfillment system.
//!
//! - [`Config`]: environment configuration
//! - [`telemetry`]: tracing subscriber and Prometheus exporter
//! - [`Services`]: the managed components of each service role

pub mod config;
pub mod error;
pub mod services;
pub mod telemetry;

pub use config::{Config, ConfigError, LogFormat, ServiceConfig, ServiceRole};
pub use error::AppError;
pub use services::{BrokerConnector, Managed, Services};
