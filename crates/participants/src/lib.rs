//! Warehouse and courier services taking part in the create-order saga.
//!
//! Each participant keeps its state in memory and answers the saga's
//! commands with result events on its own result topic.

pub mod courier;
pub mod warehouse;

pub use courier::{CourierError, CourierHandler, InMemoryCouriers};
pub use warehouse::{InMemoryStock, WarehouseError, WarehouseHandler};
