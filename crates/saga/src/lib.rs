//! Create-order saga of the order service.
//!
//! This crate provides:
//! - [`CreateOrderSaga`]: the saga steps, each staging one command in the
//!   outbox
//! - [`SagaEventHandler`] / [`OrderCommandHandler`]: pipeline handlers for
//!   the result topics and the order service's own command topic
//! - [`CreateOrderUseCase`]: order creation entry point
//! - [`outbox_routes`]: destination topics of the saga's commands

pub mod create_order;
pub mod error;
pub mod handlers;
pub mod use_case;

pub use create_order::{CreateOrderSaga, outbox_routes};
pub use error::{Result, SagaError};
pub use handlers::{OrderCommandHandler, SagaEventHandler};
pub use use_case::CreateOrderUseCase;
