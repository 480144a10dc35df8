//! Courier participant: courier assignment.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use common::messages::{CourierAssigned, CourierAssignmentFailed, CourierCommand, CourierResult};
use common::{CourierId, OrderId};
use messaging::{Envelope, Handler};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by courier assignment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CourierError {
    #[error("No courier available for order {0}")]
    NoCourierAvailable(OrderId),
}

#[derive(Debug, Default)]
struct CourierState {
    available: VecDeque<CourierId>,
    assignments: HashMap<OrderId, CourierId>,
}

/// In-memory pool of couriers, handed out first come first served.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCouriers {
    state: Arc<Mutex<CourierState>>,
}

impl InMemoryCouriers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a courier to the pool.
    pub async fn add_courier(&self, courier_id: CourierId) {
        self.state.lock().await.available.push_back(courier_id);
    }

    pub async fn available_count(&self) -> usize {
        self.state.lock().await.available.len()
    }

    /// Returns the courier assigned to an order.
    pub async fn assignment(&self, order_id: OrderId) -> Option<CourierId> {
        self.state.lock().await.assignments.get(&order_id).copied()
    }

    /// Takes the next available courier for an order.
    ///
    /// An order that already has a courier gets the same one back.
    pub async fn assign(&self, order_id: OrderId) -> Result<CourierId, CourierError> {
        let mut state = self.state.lock().await;
        if let Some(&courier_id) = state.assignments.get(&order_id) {
            return Ok(courier_id);
        }

        let courier_id = state
            .available
            .pop_front()
            .ok_or(CourierError::NoCourierAvailable(order_id))?;
        state.assignments.insert(order_id, courier_id);
        Ok(courier_id)
    }
}

/// Answers assignment commands on `courier-command-results`.
pub struct CourierHandler {
    couriers: InMemoryCouriers,
}

impl CourierHandler {
    pub fn new(couriers: InMemoryCouriers) -> Self {
        Self { couriers }
    }
}

#[async_trait]
impl Handler for CourierHandler {
    type Message = CourierCommand;
    type Output = CourierResult;
    type Error = Infallible;

    async fn handle(
        &self,
        envelope: Envelope<CourierCommand>,
    ) -> Result<Option<Envelope<CourierResult>>, Infallible> {
        let CourierCommand::AssignCourier(command) = envelope.message;
        let order_id = command.order_id;

        let result: CourierResult = match self.couriers.assign(order_id).await {
            Ok(courier_id) => {
                metrics::counter!("courier_assignments_total", "outcome" => "assigned")
                    .increment(1);
                tracing::info!(%order_id, %courier_id, "courier assigned");
                CourierAssigned {
                    order_id,
                    courier_id,
                }
                .into()
            }
            Err(err) => {
                metrics::counter!("courier_assignments_total", "outcome" => "failed").increment(1);
                tracing::info!(%order_id, reason = %err, "courier assignment failed");
                CourierAssignmentFailed { order_id }.into()
            }
        };
        Ok(Some(Envelope::new(result)))
    }
}
