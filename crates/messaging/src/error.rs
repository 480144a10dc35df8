//! Messaging error types.

use thiserror::Error;

/// Errors reported by a broker adapter.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The connection was closed; no further messages will arrive.
    #[error("Broker connection closed")]
    Closed,

    /// Receiving the next message failed.
    #[error("Failed to receive message: {0}")]
    Receive(String),

    /// Publishing to a topic failed.
    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// The adapter could not be created or configured.
    #[error("Broker connection error: {0}")]
    Connection(String),
}

/// Errors that can occur in the processing pipeline.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// `start` was called on a component that is already running.
    #[error("Already started")]
    AlreadyStarted,

    /// `stop` or `read` was called on a component that is not running.
    #[error("Not started")]
    NotStarted,

    /// The component has been closed and cannot be restarted.
    #[error("Closed")]
    Closed,

    /// The caller's cancellation token fired while waiting.
    #[error("Cancelled")]
    Cancelled,

    /// The reader's producer task exited; no further messages will arrive.
    #[error("Reader stopped")]
    ReaderStopped,

    /// A raw broker message is not a valid envelope for this consumer.
    #[error("Failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// An envelope could not be serialized.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// An error from the broker adapter.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
