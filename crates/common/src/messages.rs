//! Message contracts exchanged between the services.
//!
//! Each payload struct carries its wire name as [`NamedPayload::NAME`]. Every
//! consumer decodes into a closed enum of the payloads it accepts, keyed on
//! the envelope's `Name`, so a message is decoded exactly once.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{CourierId, OrderId, ProductId};

/// Wire names of every message.
pub mod names {
    pub const RESERVE_ITEMS: &str = "create_order.reserve_items";
    pub const RELEASE_ITEMS: &str = "create_order.release_items";
    pub const CANCEL_OUT_OF_STOCK: &str = "create_order.cancel_out_of_stock";
    pub const ASSIGN_COURIER: &str = "create_order.assign_courier";
    pub const BEGIN_DELIVERY: &str = "create_order.begin_delivery";
    pub const CANCEL_COURIER_NOT_FOUND: &str = "create_order.cancel_courier_not_found";
    pub const ITEMS_RESERVED: &str = "warehouse.items_reserved";
    pub const ITEMS_RESERVATION_FAILED: &str = "warehouse.items_reservation_failed";
    pub const ITEMS_RELEASED: &str = "warehouse.items_released";
    pub const COURIER_ASSIGNED: &str = "courier.courier_assigned";
    pub const COURIER_ASSIGNMENT_FAILED: &str = "courier.courier_assignment_failed";
}

/// A payload that knows its own wire name.
pub trait NamedPayload: Serialize {
    /// The `Name` placed on the envelope.
    const NAME: &'static str;
}

/// A closed set of messages a consumer understands.
///
/// Implementations are serde enums tagged with `Name` and carrying their
/// body under `Payload`.
pub trait MessageSet: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the wire name of this message.
    fn name(&self) -> &'static str;
}

/// A line item as carried in warehouse commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "ProductID")]
    pub product_id: ProductId,
    #[serde(rename = "Count")]
    pub count: u32,
}

impl Item {
    pub fn new(product_id: impl Into<ProductId>, count: u32) -> Self {
        Self {
            product_id: product_id.into(),
            count,
        }
    }
}

macro_rules! payload {
    ($(#[$meta:meta])* $name:ident = $wire:path { $($field:ident : $rename:literal : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(
                #[serde(rename = $rename)]
                pub $field: $ty,
            )*
        }

        impl NamedPayload for $name {
            const NAME: &'static str = $wire;
        }
    };
}

// Commands issued by the create-order saga.

payload!(
    /// Reserve stock for every line of an order.
    ReserveItems = names::RESERVE_ITEMS {
        order_id: "OrderID": OrderId,
        items: "Items": Vec<Item>,
    }
);

payload!(
    /// Return previously reserved stock (compensation).
    ReleaseItems = names::RELEASE_ITEMS {
        order_id: "OrderID": OrderId,
        items: "Items": Vec<Item>,
    }
);

payload!(
    /// Cancel an order whose items could not be reserved.
    CancelOutOfStock = names::CANCEL_OUT_OF_STOCK {
        order_id: "OrderID": OrderId,
    }
);

payload!(
    /// Find a courier for an order.
    AssignCourier = names::ASSIGN_COURIER {
        order_id: "OrderID": OrderId,
    }
);

payload!(
    /// Hand an order to its assigned courier.
    BeginDelivery = names::BEGIN_DELIVERY {
        order_id: "OrderID": OrderId,
        courier_id: "CourierID": CourierId,
    }
);

payload!(
    /// Cancel an order for which no courier was available.
    CancelCourierNotFound = names::CANCEL_COURIER_NOT_FOUND {
        order_id: "OrderID": OrderId,
    }
);

// Results reported by the warehouse and courier services.

payload!(
    ItemsReserved = names::ITEMS_RESERVED {
        order_id: "OrderID": OrderId,
    }
);

payload!(
    ItemsReservationFailed = names::ITEMS_RESERVATION_FAILED {
        order_id: "OrderID": OrderId,
    }
);

payload!(
    ItemsReleased = names::ITEMS_RELEASED {
        order_id: "OrderID": OrderId,
    }
);

payload!(
    CourierAssigned = names::COURIER_ASSIGNED {
        order_id: "OrderID": OrderId,
        courier_id: "CourierID": CourierId,
    }
);

payload!(
    CourierAssignmentFailed = names::COURIER_ASSIGNMENT_FAILED {
        order_id: "OrderID": OrderId,
    }
);

/// Commands consumed by the warehouse service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum WarehouseCommand {
    #[serde(rename = "create_order.reserve_items")]
    ReserveItems(ReserveItems),
    #[serde(rename = "create_order.release_items")]
    ReleaseItems(ReleaseItems),
}

impl MessageSet for WarehouseCommand {
    fn name(&self) -> &'static str {
        match self {
            WarehouseCommand::ReserveItems(_) => ReserveItems::NAME,
            WarehouseCommand::ReleaseItems(_) => ReleaseItems::NAME,
        }
    }
}

/// Commands consumed by the courier service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum CourierCommand {
    #[serde(rename = "create_order.assign_courier")]
    AssignCourier(AssignCourier),
}

impl MessageSet for CourierCommand {
    fn name(&self) -> &'static str {
        match self {
            CourierCommand::AssignCourier(_) => AssignCourier::NAME,
        }
    }
}

/// Commands the order service sends to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum OrderCommand {
    #[serde(rename = "create_order.cancel_out_of_stock")]
    CancelOutOfStock(CancelOutOfStock),
    #[serde(rename = "create_order.begin_delivery")]
    BeginDelivery(BeginDelivery),
    #[serde(rename = "create_order.cancel_courier_not_found")]
    CancelCourierNotFound(CancelCourierNotFound),
}

impl MessageSet for OrderCommand {
    fn name(&self) -> &'static str {
        match self {
            OrderCommand::CancelOutOfStock(_) => CancelOutOfStock::NAME,
            OrderCommand::BeginDelivery(_) => BeginDelivery::NAME,
            OrderCommand::CancelCourierNotFound(_) => CancelCourierNotFound::NAME,
        }
    }
}

/// Outcomes published on `warehouse-command-results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum WarehouseResult {
    #[serde(rename = "warehouse.items_reserved")]
    ItemsReserved(ItemsReserved),
    #[serde(rename = "warehouse.items_reservation_failed")]
    ItemsReservationFailed(ItemsReservationFailed),
    #[serde(rename = "warehouse.items_released")]
    ItemsReleased(ItemsReleased),
}

impl MessageSet for WarehouseResult {
    fn name(&self) -> &'static str {
        match self {
            WarehouseResult::ItemsReserved(_) => ItemsReserved::NAME,
            WarehouseResult::ItemsReservationFailed(_) => ItemsReservationFailed::NAME,
            WarehouseResult::ItemsReleased(_) => ItemsReleased::NAME,
        }
    }
}

/// Outcomes published on `courier-command-results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum CourierResult {
    #[serde(rename = "courier.courier_assigned")]
    CourierAssigned(CourierAssigned),
    #[serde(rename = "courier.courier_assignment_failed")]
    CourierAssignmentFailed(CourierAssignmentFailed),
}

impl MessageSet for CourierResult {
    fn name(&self) -> &'static str {
        match self {
            CourierResult::CourierAssigned(_) => CourierAssigned::NAME,
            CourierResult::CourierAssignmentFailed(_) => CourierAssignmentFailed::NAME,
        }
    }
}

/// Everything the create-order saga reacts to, read from both result topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Name", content = "Payload")]
pub enum SagaEvent {
    #[serde(rename = "warehouse.items_reserved")]
    ItemsReserved(ItemsReserved),
    #[serde(rename = "warehouse.items_reservation_failed")]
    ItemsReservationFailed(ItemsReservationFailed),
    #[serde(rename = "warehouse.items_released")]
    ItemsReleased(ItemsReleased),
    #[serde(rename = "courier.courier_assigned")]
    CourierAssigned(CourierAssigned),
    #[serde(rename = "courier.courier_assignment_failed")]
    CourierAssignmentFailed(CourierAssignmentFailed),
}

impl MessageSet for SagaEvent {
    fn name(&self) -> &'static str {
        match self {
            SagaEvent::ItemsReserved(_) => ItemsReserved::NAME,
            SagaEvent::ItemsReservationFailed(_) => ItemsReservationFailed::NAME,
            SagaEvent::ItemsReleased(_) => ItemsReleased::NAME,
            SagaEvent::CourierAssigned(_) => CourierAssigned::NAME,
            SagaEvent::CourierAssignmentFailed(_) => CourierAssignmentFailed::NAME,
        }
    }
}

macro_rules! message_set_from {
    ($set:ident: $($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for $set {
                fn from(payload: $variant) -> Self {
                    $set::$variant(payload)
                }
            }
        )+
    };
}

message_set_from!(WarehouseCommand: ReserveItems, ReleaseItems);
message_set_from!(CourierCommand: AssignCourier);
message_set_from!(OrderCommand: CancelOutOfStock, BeginDelivery, CancelCourierNotFound);
message_set_from!(WarehouseResult: ItemsReserved, ItemsReservationFailed, ItemsReleased);
message_set_from!(CourierResult: CourierAssigned, CourierAssignmentFailed);
message_set_from!(
    SagaEvent: ItemsReserved,
    ItemsReservationFailed,
    ItemsReleased,
    CourierAssigned,
    CourierAssignmentFailed,
);
