//! Domain error types.

use thiserror::Error;

use crate::order::OrderError;
use crate::repository::RepositoryError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order rejected the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Loading or storing the order failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError {
    /// Returns true if the operation lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Repository(RepositoryError::Conflict { .. }))
    }
}
