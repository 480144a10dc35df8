//! Service startup and shutdown errors.

use messaging::{BrokerError, MessagingError};
use outbox::OutboxError;
use thiserror::Error;

use crate::config::{ConfigError, ServiceRole};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Pipeline error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    #[error("Repository error: {0}")]
    Repository(#[from] domain::RepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The role talks to other services, which needs the Kafka broker.
    #[error("SERVICE={0} requires a build with the `kafka` feature")]
    BrokerUnavailable(ServiceRole),
}
