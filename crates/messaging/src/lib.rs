//! Broker plumbing and the message processing pipeline.
//!
//! - [`BrokerReader`] / [`BrokerWriter`]: raw byte transport, with an
//!   in-memory implementation and a Kafka one behind the `kafka` feature
//! - [`Envelope`]: the `{ID, Name, Payload}` wire format
//! - [`Reader`] → [`Handler`] → [`Writer`], driven by a [`Processor`]

pub mod broker;
pub mod envelope;
pub mod error;
pub mod handler;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod processor;
pub mod reader;
pub mod writer;

pub use broker::{BrokerReader, BrokerWriter};
pub use envelope::{Envelope, encode_payload, encode_raw};
pub use error::{BrokerError, MessagingError, Result};
pub use handler::{Handler, NoReply};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaReader, KafkaWriter};
pub use memory::{InMemoryBroker, InMemoryReader, PublishedMessage};
pub use processor::Processor;
pub use reader::{Reader, ReaderConfig};
pub use writer::Writer;
