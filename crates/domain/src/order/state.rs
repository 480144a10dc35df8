//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Created ──┬──► Delivering ──┬──► Delivered
///           │                 └──► CustomerCanceled
///           ├──► CanceledOutOfStock
///           └──► CanceledCourierNotFound
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order accepted, stock reservation and courier assignment in progress.
    #[default]
    Created,

    /// A courier has picked up the order.
    Delivering,

    /// The order arrived (terminal state).
    Delivered,

    /// The customer canceled during delivery (terminal state).
    CustomerCanceled,

    /// Stock could not be reserved (terminal state).
    CanceledOutOfStock,

    /// No courier was available (terminal state).
    CanceledCourierNotFound,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::CustomerCanceled,
        OrderStatus::CanceledOutOfStock,
        OrderStatus::CanceledCourierNotFound,
    ];

    /// Returns true if delivery can begin in this status.
    pub fn can_begin_delivery(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if the order can be canceled for missing stock.
    pub fn can_cancel_out_of_stock(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if the order can be canceled for a missing courier.
    pub fn can_cancel_courier_not_found(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if the customer can cancel in this status.
    pub fn can_cancel_by_customer(&self) -> bool {
        matches!(self, OrderStatus::Delivering)
    }

    /// Returns true if delivery can complete in this status.
    pub fn can_complete_delivery(&self) -> bool {
        matches!(self, OrderStatus::Delivering)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Created | OrderStatus::Delivering)
    }

    /// Returns the status name as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::Delivering => "Delivering",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::CustomerCanceled => "CustomerCanceled",
            OrderStatus::CanceledOutOfStock => "CanceledOutOfStock",
            OrderStatus::CanceledCourierNotFound => "CanceledCourierNotFound",
        }
    }

    /// Parses a stored status name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
