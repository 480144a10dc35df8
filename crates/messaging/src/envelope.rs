//! Wire envelope shared by every command, event and result topic.
//!
//! On the wire an envelope is `{ "ID": <uuid>, "Name": <string>, "Payload": {..} }`.
//! The `Name`/`Payload` pair is produced by the message set's serde tagging,
//! so decoding picks the payload type from `Name` in a single pass.

use common::{MessageId, MessageSet, NamedPayload};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{MessagingError, Result};

/// A message together with its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<M> {
    /// Message identity, fresh for every message.
    #[serde(rename = "ID")]
    pub id: MessageId,

    /// The typed message; serializes as `Name` plus `Payload`.
    #[serde(flatten)]
    pub message: M,
}

impl<M: MessageSet> Envelope<M> {
    /// Wraps a message under a fresh message id.
    pub fn new(message: impl Into<M>) -> Self {
        Self::with_id(MessageId::new(), message)
    }

    /// Wraps a message under an existing message id.
    pub fn with_id(id: MessageId, message: impl Into<M>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }

    /// Returns the `Name` of the wrapped message.
    pub fn name(&self) -> &'static str {
        self.message.name()
    }

    /// Serializes the envelope to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(MessagingError::Encode)
    }

    /// Parses the wire form into this consumer's message set.
    ///
    /// Fails with [`MessagingError::Decode`] when the bytes are not an
    /// envelope or when `Name` is not part of the set.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(MessagingError::Decode)
    }
}

#[derive(Serialize)]
struct RawEnvelope<'a> {
    #[serde(rename = "ID")]
    id: MessageId,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Payload")]
    payload: &'a RawValue,
}

/// Builds the wire form from an already serialized payload.
///
/// Used when relaying stored messages whose payload type is only known by
/// name.
pub fn encode_raw(id: MessageId, name: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let payload: &RawValue = serde_json::from_slice(payload).map_err(MessagingError::Decode)?;
    serde_json::to_vec(&RawEnvelope { id, name, payload }).map_err(MessagingError::Encode)
}

/// Serializes a single payload to the bytes stored for later relay.
pub fn encode_payload<P: NamedPayload>(payload: &P) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(MessagingError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::messages::{
        AssignCourier, CourierAssigned, ItemsReserved, ReserveItems, SagaEvent, WarehouseCommand,
    };
    use common::{CourierId, Item, OrderId};

    #[test]
    fn encodes_id_name_and_payload() {
        let order_id = OrderId::new();
        let envelope = Envelope::<WarehouseCommand>::new(WarehouseCommand::ReserveItems(
            ReserveItems {
                order_id,
                items: vec![Item::new("SKU-001", 1)],
            },
        ));

        let json: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();
        assert_eq!(json["ID"], envelope.id.to_string());
        assert_eq!(json["Name"], "create_order.reserve_items");
        assert_eq!(json["Payload"]["OrderID"], order_id.to_string());
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn decodes_into_matching_variant() {
        let order_id = OrderId::new();
        let courier_id = CourierId::new();
        let id = MessageId::new();
        let bytes = serde_json::to_vec(&serde_json::json!({
            "Payload": { "OrderID": order_id, "CourierID": courier_id },
            "Name": "courier.courier_assigned",
            "ID": id,
        }))
        .unwrap();

        let envelope = Envelope::<SagaEvent>::decode(&bytes).unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(
            envelope.message,
            SagaEvent::CourierAssigned(CourierAssigned {
                order_id,
                courier_id
            })
        );
        assert_eq!(envelope.name(), "courier.courier_assigned");
    }

    #[test]
    fn rejects_name_outside_message_set() {
        let envelope = Envelope::<common::messages::CourierCommand>::new(
            common::messages::CourierCommand::AssignCourier(AssignCourier {
                order_id: OrderId::new(),
            }),
        );
        let bytes = envelope.encode().unwrap();

        let err = Envelope::<SagaEvent>::decode(&bytes).unwrap_err();
        assert!(matches!(err, MessagingError::Decode(_)));
    }

    #[test]
    fn rejects_garbage() {
        let err = Envelope::<SagaEvent>::decode(b"not json").unwrap_err();
        assert!(matches!(err, MessagingError::Decode(_)));
    }

    #[test]
    fn raw_encoding_matches_typed_encoding() {
        let order_id = OrderId::new();
        let id = MessageId::new();
        let payload = encode_payload(&ItemsReserved { order_id }).unwrap();

        let raw = encode_raw(id, ItemsReserved::NAME, &payload).unwrap();
        let decoded = Envelope::<SagaEvent>::decode(&raw).unwrap();

        assert_eq!(decoded.id, id);
        assert_eq!(
            decoded.message,
            SagaEvent::ItemsReserved(ItemsReserved { order_id })
        );
    }
}
