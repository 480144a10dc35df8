//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{CourierId, Item, ProductId};
use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }
}

/// A line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Price per unit.
    pub price: Money,

    /// Units ordered.
    pub count: u32,
}

impl OrderItem {
    pub fn new(product_id: impl Into<ProductId>, price: Money, count: u32) -> Self {
        Self {
            product_id: product_id.into(),
            price,
            count,
        }
    }

    /// Returns the line as carried in warehouse commands.
    pub fn to_item(&self) -> Item {
        Item::new(self.product_id.clone(), self.count)
    }
}

/// Delivery details of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Courier carrying the order, once assigned.
    pub courier_id: Option<CourierId>,

    /// Destination address.
    pub address: String,

    /// When the order arrived.
    pub arrived: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Creates delivery details for an order not yet handed to a courier.
    pub fn to(address: impl Into<String>) -> Self {
        Self {
            courier_id: None,
            address: address.into(),
            arrived: None,
        }
    }
}
