//! Logical broker topics.

use serde::{Deserialize, Serialize};

/// A logical topic on the message broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Commands the order service sends to itself.
    OrderCommands,
    /// Commands for the warehouse service.
    WarehouseCommands,
    /// Commands for the courier service.
    CourierCommands,
    /// Outcomes of warehouse commands.
    WarehouseCommandResults,
    /// Outcomes of courier commands.
    CourierCommandResults,
    /// Catalogue changes published by the product owner.
    ProductEvents,
}

impl Topic {
    /// Every topic the services use.
    pub const ALL: [Topic; 6] = [
        Topic::OrderCommands,
        Topic::WarehouseCommands,
        Topic::CourierCommands,
        Topic::WarehouseCommandResults,
        Topic::CourierCommandResults,
        Topic::ProductEvents,
    ];

    /// Returns the topic name used on the broker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderCommands => "order-commands",
            Topic::WarehouseCommands => "warehouse-commands",
            Topic::CourierCommands => "courier-commands",
            Topic::WarehouseCommandResults => "warehouse-command-results",
            Topic::CourierCommandResults => "courier-command-results",
            Topic::ProductEvents => "product-events",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
