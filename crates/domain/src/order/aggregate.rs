//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CourierId, CustomerId, Item, OrderId, Version};
use serde::{Deserialize, Serialize};

use super::{Delivery, OrderError, OrderItem, OrderStatus};

/// Order aggregate root.
///
/// Stored as current state. Every persisted mutation moves `version`
/// forward and writers must present the version they read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: OrderStatus,
    created: DateTime<Utc>,
    version: Version,
    delivery: Delivery,
    items: Vec<OrderItem>,
}

impl Order {
    /// Creates a new order in `Created` status.
    ///
    /// Requires at least one item, a positive count and price on every
    /// item, and a non-empty address.
    pub fn new(
        customer_id: CustomerId,
        address: impl Into<String>,
        items: Vec<OrderItem>,
        created: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let address = address.into();

        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            if item.count == 0 {
                return Err(OrderError::InvalidCount {
                    product_id: item.product_id.to_string(),
                    count: item.count,
                });
            }
            if !item.price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.price.cents(),
                });
            }
        }
        if address.trim().is_empty() {
            return Err(OrderError::EmptyAddress);
        }

        Ok(Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Created,
            created,
            version: Version::initial(),
            delivery: Delivery::to(address),
            items,
        })
    }

    /// Rebuilds an order from storage without validation.
    pub(crate) fn restore(
        id: OrderId,
        customer_id: CustomerId,
        status: OrderStatus,
        created: DateTime<Utc>,
        version: Version,
        delivery: Delivery,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            id,
            customer_id,
            status,
            created,
            version,
            delivery,
            items,
        }
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns when the order was created.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns the stored version; `Version::initial()` before the first
    /// insert.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the lines as carried in warehouse commands.
    pub fn reservation_items(&self) -> Vec<Item> {
        self.items.iter().map(OrderItem::to_item).collect()
    }
}

// Transitions
impl Order {
    /// Hands the order to `courier_id`. Legal only from `Created`.
    pub fn begin_delivery(&mut self, courier_id: CourierId) -> Result<(), OrderError> {
        self.guard(self.status.can_begin_delivery(), "begin delivery")?;
        self.status = OrderStatus::Delivering;
        self.delivery.courier_id = Some(courier_id);
        Ok(())
    }

    /// Cancels because stock could not be reserved. Legal only from
    /// `Created`.
    pub fn cancel_out_of_stock(&mut self) -> Result<(), OrderError> {
        self.guard(self.status.can_cancel_out_of_stock(), "cancel out of stock")?;
        self.status = OrderStatus::CanceledOutOfStock;
        Ok(())
    }

    /// Cancels because no courier was found. Legal only from `Created`.
    pub fn cancel_courier_not_found(&mut self) -> Result<(), OrderError> {
        self.guard(
            self.status.can_cancel_courier_not_found(),
            "cancel courier not found",
        )?;
        self.status = OrderStatus::CanceledCourierNotFound;
        Ok(())
    }

    /// Cancels on the customer's request. Legal only from `Delivering`.
    pub fn cancel_by_customer(&mut self) -> Result<(), OrderError> {
        self.guard(self.status.can_cancel_by_customer(), "cancel by customer")?;
        self.status = OrderStatus::CustomerCanceled;
        Ok(())
    }

    /// Marks the order delivered at `now`. Legal only from `Delivering`.
    pub fn complete_delivery(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.guard(self.status.can_complete_delivery(), "complete delivery")?;
        self.status = OrderStatus::Delivered;
        self.delivery.arrived = Some(now);
        Ok(())
    }

    fn guard(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            })
        }
    }
}
