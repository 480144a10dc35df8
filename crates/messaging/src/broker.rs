//! Broker adapter traits.
//!
//! The pipeline only needs two capabilities from a broker: a blocking
//! receive of raw bytes and a publish of raw bytes to a named topic.

use async_trait::async_trait;

use crate::error::BrokerError;

/// Receiving side of a broker connection, bound to one or more topics.
///
/// `read_message` must be cancel safe: dropping the future before it
/// completes must not lose a message that was not returned.
#[async_trait]
pub trait BrokerReader: Send + Sync {
    /// Waits for the next raw message.
    ///
    /// Returns [`BrokerError::Closed`] once the connection is closed.
    async fn read_message(&self) -> Result<Vec<u8>, BrokerError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Publishing side of a broker connection.
#[async_trait]
pub trait BrokerWriter: Send + Sync {
    /// Publishes `payload` to `topic` under the partitioning `key`.
    async fn write_message(
        &self,
        topic: &str,
        key: &[u8],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError>;

    /// Flushes pending publishes and closes the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}
