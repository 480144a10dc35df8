//! Domain layer for the order service.
//!
//! This crate provides:
//! - The [`Order`] aggregate with its status state machine
//! - [`UnitOfWork`] / [`Transaction`] for version-checked persistence with
//!   same-transaction outbox writes
//! - In-memory and PostgreSQL stores
//! - [`OrderService`] for status transitions on stored orders

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;

pub use error::DomainError;
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use order::{
    DEFAULT_CONFLICT_RETRIES, Delivery, Money, Order, OrderError, OrderItem, OrderService,
    OrderStatus,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use repository::{OrderRepository, RepositoryError, Transaction, UnitOfWork};
