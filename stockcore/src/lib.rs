//! `StockCore` - multi-warehouse inventory allocation and transfer engine
//!
//! Tracks per-warehouse stock levels and an append-only movement ledger, and
//! applies two kinds of transfers against them:
//!
//! - **move-in**: one product from one warehouse to another
//! - **move-out**: an order shipped to a customer, split across the
//!   warehouses nearest to the delivery zip code
//!
//! Storage, the nearest-warehouse ranking cache and the change notification
//! transport are capability traits ([`StockStore`], [`RankingCache`],
//! [`Notifier`]) so the engine runs unchanged over the in-memory and
//! PostgreSQL backends.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocation;
pub mod catalog;
pub mod config;
pub mod distance;
pub mod engine;
pub mod errors;
pub mod model;
pub mod notifier;
pub mod ranking;
pub mod store;
pub mod types;

pub use allocation::{Allocation, AllocationCandidate, allocate, nearest_warehouse_for_zip};
pub use catalog::{Registration, WarehouseRegistry};
pub use config::{EngineConfig, RankingMode, RetryConfig};
pub use distance::distance;
pub use engine::{TransferEngine, TransferResult, TransferWarning};
pub use errors::{
    AllocationError, CatalogError, InvalidZipCode, NotifyError, Operation, RankingCacheError,
    StockStoreError, TransferError,
};
pub use model::{
    MoveInRequest, MoveOutItem, MoveOutRequest, MovementDestination, MovementQuery, NewWarehouse,
    StockMovement, Warehouse, WarehouseDistance, WarehouseProduct, WarehouseStock,
};
pub use notifier::{ChangeNotifier, NotificationMessage, Notifier, QuantityChanged};
pub use ranking::RankingCache;
pub use store::{LockedRow, StockStore, StockTransaction, WarehouseCatalog};
pub use types::{
    Distance, MovementId, ProductId, ProductName, Quantity, StockRowId, Timestamp, UserId,
    WarehouseId, ZipCode,
};
