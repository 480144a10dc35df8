//! Saga error types.

use domain::{DomainError, OrderError, RepositoryError};
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur while advancing the create-order saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order rejected the step.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A use case on a stored order failed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The order or outbox transaction failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The outbound command could not be built.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;
