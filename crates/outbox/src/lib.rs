//! Transactional outbox.
//!
//! A use case stores the messages it wants to publish in the same local
//! transaction as its aggregate change. The [`OutboxProcessor`] then relays
//! them to the broker and deletes each one only after a confirmed publish.
//!
//! - [`OutboxRepository`]: pending message storage (in-memory and PostgreSQL)
//! - [`Publisher`]: resolves a message's topic from its name and publishes it
//! - [`OutboxProcessor`]: the polling relay

pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod processor;
pub mod publisher;
pub mod repository;

pub use error::{OutboxError, Result};
pub use memory::InMemoryOutboxRepository;
pub use message::OutboxMessage;
pub use postgres::{PostgresOutboxRepository, insert_message};
pub use processor::{BatchReport, OutboxConfig, OutboxProcessor};
pub use publisher::{BrokerPublisher, Publisher, TopicRoutes};
pub use repository::OutboxRepository;
