use chrono::{DateTime, Utc};
use common::{MessageId, NamedPayload};

use crate::Result;

/// A message waiting to be relayed to the broker.
///
/// The row exists until the broker has confirmed the publish. A crash
/// between publish and delete republishes it, so consumers see each message
/// at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    /// Message id, reused as the envelope `ID` on publish.
    pub id: MessageId,
    /// Message name; selects the destination topic.
    pub message_type: String,
    /// Serialized payload.
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Number of failed publish attempts so far.
    pub attempts: u32,
}

impl OutboxMessage {
    /// Builds a message for `payload` under a fresh message id.
    pub fn from_payload<P: NamedPayload>(payload: &P, created_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            message_type: P::NAME.to_string(),
            payload: serde_json::to_vec(payload)?,
            created_at,
            attempts: 0,
        })
    }

    /// Returns `true` once the message has failed `max_attempts` times.
    pub fn is_parked(&self, max_attempts: Option<u32>) -> bool {
        max_attempts.is_some_and(|max| self.attempts >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use common::messages::CancelOutOfStock;

    #[test]
    fn from_payload_uses_payload_name() {
        let order_id = OrderId::new();
        let now = Utc::now();
        let message = OutboxMessage::from_payload(&CancelOutOfStock { order_id }, now).unwrap();

        assert_eq!(message.message_type, "create_order.cancel_out_of_stock");
        assert_eq!(message.created_at, now);
        assert_eq!(message.attempts, 0);
        let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(payload["OrderID"], order_id.to_string());
    }

    #[test]
    fn fresh_ids_per_message() {
        let payload = CancelOutOfStock {
            order_id: OrderId::new(),
        };
        let a = OutboxMessage::from_payload(&payload, Utc::now()).unwrap();
        let b = OutboxMessage::from_payload(&payload, Utc::now()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn parking_threshold() {
        let mut message = OutboxMessage::from_payload(
            &CancelOutOfStock {
                order_id: OrderId::new(),
            },
            Utc::now(),
        )
        .unwrap();

        assert!(!message.is_parked(None));
        assert!(!message.is_parked(Some(2)));
        message.attempts = 2;
        assert!(message.is_parked(Some(2)));
        assert!(!message.is_parked(None));
    }
}
