//! Entities and read models shared by the engine and every backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    Distance, MovementId, ProductId, ProductName, Quantity, StockRowId, Timestamp, UserId,
    WarehouseId, ZipCode,
};

/// A physical stock location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: ZipCode,
    /// The central warehouse. At most one live warehouse has this set.
    pub is_main: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Warehouse {
    /// Whether the warehouse has been soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for registering a warehouse; identity and timestamps are assigned
/// on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: ZipCode,
    pub is_main: bool,
}

impl NewWarehouse {
    /// Assigns a fresh identifier and stamps both timestamps with `at`.
    pub fn into_warehouse(self, at: Timestamp) -> Warehouse {
        Warehouse {
            id: WarehouseId::generate(),
            name: self.name,
            street: self.street,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            is_main: self.is_main,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }
}

/// Stock of one product held in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseProduct {
    pub id: StockRowId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub product_name: ProductName,
    pub quantity: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Where a movement sent its units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementDestination {
    /// Inter-warehouse transfer.
    Warehouse(WarehouseId),
    /// Shipment to a customer.
    User(UserId),
}

impl MovementDestination {
    /// The receiving warehouse, if this was a transfer.
    pub const fn warehouse(&self) -> Option<WarehouseId> {
        match self {
            Self::Warehouse(id) => Some(*id),
            Self::User(_) => None,
        }
    }

    /// The receiving customer, if this was a shipment.
    pub const fn user(&self) -> Option<UserId> {
        match self {
            Self::Warehouse(_) => None,
            Self::User(id) => Some(*id),
        }
    }
}

/// Immutable ledger entry recording one physical movement of units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub product_name: ProductName,
    pub quantity: Quantity,
    pub source: WarehouseId,
    pub destination: MovementDestination,
    pub created_at: Timestamp,
}

/// One candidate source for allocation: a warehouse's zip and its on-hand
/// quantity for the product being allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_id: WarehouseId,
    pub zip_code: ZipCode,
    pub quantity: i64,
}

/// A member of a zip code's ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarehouseDistance {
    pub warehouse_id: WarehouseId,
    pub distance: Distance,
}

/// Which ledger entries to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementQuery {
    All,
    Product(ProductId),
    Source(WarehouseId),
    DestinationWarehouse(WarehouseId),
    DestinationUser(UserId),
}

impl MovementQuery {
    /// Whether `movement` belongs in the result of this query.
    pub fn matches(&self, movement: &StockMovement) -> bool {
        match *self {
            Self::All => true,
            Self::Product(id) => movement.product_id == id,
            Self::Source(id) => movement.source == id,
            Self::DestinationWarehouse(id) => movement.destination.warehouse() == Some(id),
            Self::DestinationUser(id) => movement.destination.user() == Some(id),
        }
    }
}

/// A single line of a customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Carried for order bookkeeping; allocation ignores it.
    pub unit_price: Decimal,
}

/// Transfer of one product between two warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveInRequest {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub from: WarehouseId,
    pub to: WarehouseId,
}

/// Shipment of an order to a customer, sourced from the nearest warehouses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutRequest {
    pub items: Vec<MoveOutItem>,
    pub destination_zip: ZipCode,
    pub user_id: UserId,
}
