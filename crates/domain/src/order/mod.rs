//! Order aggregate and related types.

mod aggregate;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use service::{DEFAULT_CONFLICT_RETRIES, OrderService};
pub use state::OrderStatus;
pub use value_objects::{Delivery, Money, OrderItem};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in a status that allows the action.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// Invalid item count.
    #[error("Invalid count for {product_id}: {count} (must be greater than 0)")]
    InvalidCount { product_id: String, count: u32 },

    /// Invalid price.
    #[error("Invalid price for {product_id}: {price} (must be greater than 0)")]
    InvalidPrice { product_id: String, price: i64 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Delivery address is empty.
    #[error("Delivery address is required")]
    EmptyAddress,
}
