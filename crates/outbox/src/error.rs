//! Outbox error types.

use common::MessageId;
use messaging::{BrokerError, MessagingError};
use thiserror::Error;

/// Errors that can occur when storing or relaying outbox messages.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// No pending message has this id.
    #[error("Outbox message not found: {0}")]
    NotFound(MessageId),

    /// A message with this id is already stored.
    #[error("Outbox message already exists: {0}")]
    Duplicate(MessageId),

    /// No topic is routed for this message type. The message stays stored
    /// until an operator intervenes.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Publishing to the broker failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The stored payload could not be wrapped in an envelope.
    #[error("Envelope error: {0}")]
    Envelope(#[from] MessagingError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `start` was called while the processor is running.
    #[error("Outbox processor already started")]
    AlreadyStarted,

    /// `stop` was called while the processor is not running.
    #[error("Outbox processor not started")]
    NotStarted,
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
