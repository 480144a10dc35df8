//! Warehouse participant: stock reservation and release.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::messages::{
    Item, ItemsReleased, ItemsReservationFailed, ItemsReserved, WarehouseCommand, WarehouseResult,
};
use common::{OrderId, ProductId};
use messaging::{Envelope, Handler};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by the warehouse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WarehouseError {
    /// The product is not stocked at all.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Not enough units are in stock.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The summed count of a product does not fit in a `u32`.
    #[error("Requested quantity of {0} is too large")]
    QuantityOverflow(ProductId),

    /// Nothing is reserved for the order.
    #[error("No reservation for order {0}")]
    NoReservation(OrderId),
}

#[derive(Debug, Default)]
struct StockState {
    available: HashMap<ProductId, u32>,
    reservations: HashMap<OrderId, Vec<Item>>,
}

/// In-memory stock table with per-order reservations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStock {
    state: Arc<RwLock<StockState>>,
}

impl InMemoryStock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available count of a product.
    pub async fn set_stock(&self, product_id: impl Into<ProductId>, count: u32) {
        self.state
            .write()
            .await
            .available
            .insert(product_id.into(), count);
    }

    /// Returns the available count of a product.
    pub async fn available(&self, product_id: &ProductId) -> u32 {
        self.state
            .read()
            .await
            .available
            .get(product_id)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the items reserved for an order.
    pub async fn reservation(&self, order_id: OrderId) -> Option<Vec<Item>> {
        self.state.read().await.reservations.get(&order_id).cloned()
    }

    /// Reserves every item or none of them.
    ///
    /// Reserving again for an order that already holds a reservation is a
    /// no-op, so a redelivered command does not take stock twice.
    pub async fn reserve(&self, order_id: OrderId, items: &[Item]) -> Result<(), WarehouseError> {
        let mut state = self.state.write().await;
        if state.reservations.contains_key(&order_id) {
            tracing::debug!(%order_id, "items already reserved");
            return Ok(());
        }

        let requested = totals(items)?;
        for (product_id, &count) in &requested {
            let available = *state
                .available
                .get(product_id)
                .ok_or_else(|| WarehouseError::UnknownProduct(product_id.clone()))?;
            if available < count {
                return Err(WarehouseError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: count,
                    available,
                });
            }
        }

        for (product_id, count) in requested {
            if let Some(available) = state.available.get_mut(&product_id) {
                *available -= count;
            }
        }
        state.reservations.insert(order_id, items.to_vec());
        Ok(())
    }

    /// Returns an order's reserved items to stock.
    pub async fn release(&self, order_id: OrderId) -> Result<Vec<Item>, WarehouseError> {
        let mut state = self.state.write().await;
        let items = state
            .reservations
            .remove(&order_id)
            .ok_or(WarehouseError::NoReservation(order_id))?;

        for item in &items {
            let available = state.available.entry(item.product_id.clone()).or_default();
            *available = available.saturating_add(item.count);
        }
        Ok(items)
    }
}

fn totals(items: &[Item]) -> Result<HashMap<ProductId, u32>, WarehouseError> {
    let mut totals: HashMap<ProductId, u32> = HashMap::new();
    for item in items {
        let total = totals.entry(item.product_id.clone()).or_default();
        *total = total
            .checked_add(item.count)
            .ok_or_else(|| WarehouseError::QuantityOverflow(item.product_id.clone()))?;
    }
    Ok(totals)
}

/// Answers reservation commands on `warehouse-command-results`.
pub struct WarehouseHandler {
    stock: InMemoryStock,
}

impl WarehouseHandler {
    pub fn new(stock: InMemoryStock) -> Self {
        Self { stock }
    }
}

#[async_trait]
impl Handler for WarehouseHandler {
    type Message = WarehouseCommand;
    type Output = WarehouseResult;
    type Error = WarehouseError;

    async fn handle(
        &self,
        envelope: Envelope<WarehouseCommand>,
    ) -> Result<Option<Envelope<WarehouseResult>>, WarehouseError> {
        let result: WarehouseResult = match envelope.message {
            WarehouseCommand::ReserveItems(command) => {
                let order_id = command.order_id;
                match self.stock.reserve(order_id, &command.items).await {
                    Ok(()) => {
                        metrics::counter!("warehouse_reservations_total", "outcome" => "reserved")
                            .increment(1);
                        tracing::info!(%order_id, items = command.items.len(), "items reserved");
                        ItemsReserved { order_id }.into()
                    }
                    Err(err) => {
                        metrics::counter!("warehouse_reservations_total", "outcome" => "failed")
                            .increment(1);
                        tracing::info!(%order_id, reason = %err, "items reservation failed");
                        ItemsReservationFailed { order_id }.into()
                    }
                }
            }
            WarehouseCommand::ReleaseItems(command) => {
                let order_id = command.order_id;
                let released = self.stock.release(order_id).await?;
                if released != command.items {
                    tracing::warn!(%order_id, "release request differs from the reservation");
                }
                tracing::info!(%order_id, items = released.len(), "items released");
                ItemsReleased { order_id }.into()
            }
        };
        Ok(Some(Envelope::new(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::messages::{ReleaseItems, ReserveItems};

    async fn stocked() -> InMemoryStock {
        let stock = InMemoryStock::new();
        stock.set_stock("SKU-001", 5).await;
        stock.set_stock("SKU-002", 1).await;
        stock
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let stock = stocked().await;
        let order_id = OrderId::new();
        let items = vec![Item::new("SKU-001", 3), Item::new("SKU-002", 1)];

        stock.reserve(order_id, &items).await.unwrap();
        assert_eq!(stock.available(&"SKU-001".into()).await, 2);
        assert_eq!(stock.available(&"SKU-002".into()).await, 0);
        assert_eq!(stock.reservation(order_id).await, Some(items.clone()));

        let released = stock.release(order_id).await.unwrap();
        assert_eq!(released, items);
        assert_eq!(stock.available(&"SKU-001".into()).await, 5);
        assert_eq!(stock.available(&"SKU-002".into()).await, 1);
        assert!(stock.reservation(order_id).await.is_none());
    }

    #[tokio::test]
    async fn test_reservation_is_all_or_nothing() {
        let stock = stocked().await;
        let items = vec![Item::new("SKU-001", 2), Item::new("SKU-002", 2)];

        let result = stock.reserve(OrderId::new(), &items).await;

        assert_eq!(
            result,
            Err(WarehouseError::InsufficientStock {
                product_id: "SKU-002".into(),
                requested: 2,
                available: 1,
            })
        );
        assert_eq!(stock.available(&"SKU-001".into()).await, 5);
    }

    #[tokio::test]
    async fn test_repeated_lines_are_summed() {
        let stock = stocked().await;
        let items = vec![Item::new("SKU-001", 3), Item::new("SKU-001", 3)];

        assert!(stock.reserve(OrderId::new(), &items).await.is_err());
        assert_eq!(stock.available(&"SKU-001".into()).await, 5);
    }

    #[tokio::test]
    async fn test_overflowing_quantity_fails_the_reservation() {
        let stock = stocked().await;
        let handler = WarehouseHandler::new(stock.clone());
        let order_id = OrderId::new();
        let items = vec![
            Item::new("SKU-001", 3_000_000_000),
            Item::new("SKU-001", 3_000_000_000),
        ];

        assert_eq!(
            stock.reserve(order_id, &items).await,
            Err(WarehouseError::QuantityOverflow("SKU-001".into()))
        );

        let reply = handler
            .handle(Envelope::new(ReserveItems { order_id, items }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reply.message,
            WarehouseResult::ItemsReservationFailed(ItemsReservationFailed { order_id })
        );
        assert_eq!(stock.available(&"SKU-001".into()).await, 5);
        assert!(stock.reservation(order_id).await.is_none());
    }

    #[tokio::test]
    async fn test_release_saturates_stock() {
        let stock = InMemoryStock::new();
        stock.set_stock("SKU-001", 10).await;
        let order_id = OrderId::new();
        stock
            .reserve(order_id, &[Item::new("SKU-001", 10)])
            .await
            .unwrap();
        stock.set_stock("SKU-001", u32::MAX).await;

        stock.release(order_id).await.unwrap();

        assert_eq!(stock.available(&"SKU-001".into()).await, u32::MAX);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let stock = stocked().await;

        let result = stock
            .reserve(OrderId::new(), &[Item::new("SKU-404", 1)])
            .await;

        assert_eq!(result, Err(WarehouseError::UnknownProduct("SKU-404".into())));
    }

    #[tokio::test]
    async fn test_repeated_reserve_takes_stock_once() {
        let stock = stocked().await;
        let order_id = OrderId::new();
        let items = vec![Item::new("SKU-001", 2)];

        stock.reserve(order_id, &items).await.unwrap();
        stock.reserve(order_id, &items).await.unwrap();

        assert_eq!(stock.available(&"SKU-001".into()).await, 3);
    }

    #[tokio::test]
    async fn test_release_without_reservation() {
        let stock = stocked().await;
        let order_id = OrderId::new();

        assert_eq!(
            stock.release(order_id).await,
            Err(WarehouseError::NoReservation(order_id))
        );
    }

    #[tokio::test]
    async fn test_handler_replies_for_each_command() {
        let stock = stocked().await;
        let handler = WarehouseHandler::new(stock.clone());
        let order_id = OrderId::new();
        let items = vec![Item::new("SKU-002", 1)];

        let reserved = handler
            .handle(Envelope::new(ReserveItems {
                order_id,
                items: items.clone(),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reserved.message,
            WarehouseResult::ItemsReserved(ItemsReserved { order_id })
        );

        let other = OrderId::new();
        let failed = handler
            .handle(Envelope::new(ReserveItems {
                order_id: other,
                items: items.clone(),
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            failed.message,
            WarehouseResult::ItemsReservationFailed(ItemsReservationFailed { order_id: other })
        );

        let released = handler
            .handle(Envelope::new(ReleaseItems { order_id, items }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            released.message,
            WarehouseResult::ItemsReleased(ItemsReleased { order_id })
        );
        assert_eq!(stock.available(&"SKU-002".into()).await, 1);
    }

    #[tokio::test]
    async fn test_handler_rejects_duplicate_release() {
        let handler = WarehouseHandler::new(stocked().await);
        let order_id = OrderId::new();
        let release = Envelope::new(ReleaseItems {
            order_id,
            items: vec![Item::new("SKU-001", 1)],
        });

        let result = handler.handle(release).await;

        assert!(matches!(result, Err(WarehouseError::NoReservation(id)) if id == order_id));
    }
}
