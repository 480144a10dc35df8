use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{NamedPayload, Topic};
use messaging::BrokerWriter;

use crate::{OutboxError, OutboxMessage, Result};

/// Relays one stored message to the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OutboxMessage) -> Result<()>;
}

/// Destination topic per message name.
#[derive(Debug, Clone, Default)]
pub struct TopicRoutes {
    routes: HashMap<String, Topic>,
}

impl TopicRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes payload type `P` to `topic`.
    pub fn route<P: NamedPayload>(self, topic: Topic) -> Self {
        self.route_name(P::NAME, topic)
    }

    /// Routes the message name `name` to `topic`.
    pub fn route_name(mut self, name: impl Into<String>, topic: Topic) -> Self {
        self.routes.insert(name.into(), topic);
        self
    }

    /// Returns the topic for `name`, if routed.
    pub fn resolve(&self, name: &str) -> Option<Topic> {
        self.routes.get(name).copied()
    }
}

/// Publisher that wraps the stored payload in a wire envelope and writes it
/// to the routed topic.
pub struct BrokerPublisher {
    broker: Arc<dyn BrokerWriter>,
    routes: TopicRoutes,
}

impl BrokerPublisher {
    pub fn new(broker: Arc<dyn BrokerWriter>, routes: TopicRoutes) -> Self {
        Self { broker, routes }
    }
}

#[async_trait]
impl Publisher for BrokerPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<()> {
        let topic = self
            .routes
            .resolve(&message.message_type)
            .ok_or_else(|| OutboxError::UnknownMessageType(message.message_type.clone()))?;

        let bytes = messaging::encode_raw(message.id, &message.message_type, &message.payload)?;
        let key = message.id.to_string();
        self.broker
            .write_message(topic.as_str(), key.as_bytes(), bytes)
            .await?;

        tracing::debug!(
            message_id = %message.id,
            name = %message.message_type,
            %topic,
            "outbox message published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderId;
    use common::messages::{AssignCourier, CourierCommand, ReserveItems};
    use messaging::{Envelope, InMemoryBroker};

    #[tokio::test]
    async fn publishes_envelope_to_routed_topic() {
        let broker = InMemoryBroker::new();
        let publisher = BrokerPublisher::new(
            Arc::new(broker.clone()),
            TopicRoutes::new().route::<AssignCourier>(Topic::CourierCommands),
        );
        let order_id = OrderId::new();
        let message = OutboxMessage::from_payload(&AssignCourier { order_id }, Utc::now()).unwrap();

        publisher.publish(&message).await.unwrap();

        let published = broker.published(Topic::CourierCommands);
        assert_eq!(published.len(), 1);
        let envelope = Envelope::<CourierCommand>::decode(&published[0].payload).unwrap();
        assert_eq!(envelope.id, message.id);
        assert_eq!(
            envelope.message,
            CourierCommand::AssignCourier(AssignCourier { order_id })
        );
    }

    #[tokio::test]
    async fn unrouted_type_fails() {
        let broker = InMemoryBroker::new();
        let publisher = BrokerPublisher::new(Arc::new(broker.clone()), TopicRoutes::new());
        let message = OutboxMessage::from_payload(
            &ReserveItems {
                order_id: OrderId::new(),
                items: vec![],
            },
            Utc::now(),
        )
        .unwrap();

        let err = publisher.publish(&message).await.unwrap_err();

        assert!(
            matches!(err, OutboxError::UnknownMessageType(name) if name == "create_order.reserve_items")
        );
        assert!(broker.published(Topic::WarehouseCommands).is_empty());
    }

    #[test]
    fn routes_resolve_by_name() {
        let routes = TopicRoutes::new()
            .route::<ReserveItems>(Topic::WarehouseCommands)
            .route_name("custom.name", Topic::ProductEvents);

        assert_eq!(
            routes.resolve("create_order.reserve_items"),
            Some(Topic::WarehouseCommands)
        );
        assert_eq!(routes.resolve("custom.name"), Some(Topic::ProductEvents));
        assert_eq!(routes.resolve("create_order.assign_courier"), None);
    }
}
