//! Message handler trait.

use async_trait::async_trait;
use common::MessageSet;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Business logic invoked for every decoded message.
///
/// Implementations dispatch on the message variant and return the result
/// envelope to publish, or `None` when the message produces no reply.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The message set this handler consumes.
    type Message: MessageSet;

    /// The message set of replies; [`NoReply`] when there are none.
    type Output: MessageSet;

    /// Error returned when handling fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Handles one message.
    async fn handle(
        &self,
        envelope: Envelope<Self::Message>,
    ) -> Result<Option<Envelope<Self::Output>>, Self::Error>;
}

/// Output type of handlers that never reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoReply {}

impl MessageSet for NoReply {
    fn name(&self) -> &'static str {
        match *self {}
    }
}
