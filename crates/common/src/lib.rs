//! Shared vocabulary for the order fulfillment services.
//!
//! Every service (order, warehouse, courier) depends on this crate for the
//! identifiers it exchanges, the message contracts carried on the broker and
//! the logical topic names.

pub mod clock;
pub mod messages;
pub mod topics;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use messages::{Item, MessageSet, NamedPayload};
pub use topics::Topic;
pub use types::{CourierId, CustomerId, MessageId, OrderId, ProductId, Version};
