//! Stock store, ledger and warehouse catalog contracts.
//!
//! The relational side of the system is split in three capabilities:
//!
//! - [`StockStore`]: plain reads plus [`StockStore::begin`], which opens a
//!   unit of work
//! - [`StockTransaction`]: the locked read-modify-write primitives of one
//!   unit of work
//! - [`WarehouseCatalog`]: warehouse lookups and registration
//!
//! Row locks are represented by [`LockedRow`] tokens. A token can only be
//! obtained from [`StockTransaction::lock_stock_row`] and is only valid for
//! the transaction that issued it. Every lock is released when the
//! transaction is committed, rolled back or dropped, so a cancelled request
//! never leaves a row locked.

use std::future::Future;

use crate::errors::StockStoreError;
use crate::model::{
    MovementQuery, StockMovement, Warehouse, WarehouseProduct, WarehouseStock,
};
use crate::types::{ProductId, ProductName, Quantity, Timestamp, WarehouseId};

/// Proof that a transaction holds the exclusive lock on one stock row,
/// together with the row as it was when the lock was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedRow {
    product_id: ProductId,
    warehouse_id: WarehouseId,
    product_name: ProductName,
    quantity: i64,
}

impl LockedRow {
    /// Issued by store implementations once the lock is held.
    pub const fn new(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        product_name: ProductName,
        quantity: i64,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            product_name,
            quantity,
        }
    }

    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub const fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub const fn product_name(&self) -> &ProductName {
        &self.product_name
    }

    /// Quantity seen under the lock, including earlier writes of the same
    /// transaction.
    pub const fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Whether `requested` can be taken without going negative.
    pub fn covers(&self, requested: Quantity) -> bool {
        self.quantity >= requested.get()
    }
}

/// Read access to stock and the ledger, and the entry point for writes.
pub trait StockStore: Send + Sync {
    /// The unit of work type issued by [`StockStore::begin`].
    type Transaction: StockTransaction;

    /// Opens a unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StockStoreError>> + Send;

    /// Sum of the product's quantity over every warehouse.
    fn total_quantity(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<i64, StockStoreError>> + Send;

    /// Zip code and on-hand quantity of every live warehouse stocking the
    /// product, ordered by warehouse id.
    fn stock_by_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<WarehouseStock>, StockStoreError>> + Send;

    /// The stock row for one (product, warehouse) pair.
    fn stock_row(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<WarehouseProduct>, StockStoreError>> + Send;

    /// Every stock row of a product.
    fn stock_rows_by_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<WarehouseProduct>, StockStoreError>> + Send;

    /// Every stock row held by a warehouse.
    fn stock_rows_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Vec<WarehouseProduct>, StockStoreError>> + Send;

    /// Ledger entries matching `query`, oldest first.
    fn movements(
        &self,
        query: MovementQuery,
    ) -> impl Future<Output = Result<Vec<StockMovement>, StockStoreError>> + Send;
}

/// One unit of work against the stock store.
///
/// Nothing written through a transaction is visible to others before
/// [`StockTransaction::commit`]. Dropping a transaction rolls it back.
pub trait StockTransaction: Send + Sized {
    /// Locks the row for (product, warehouse) if it exists.
    ///
    /// `Ok(None)` means the warehouse does not stock the product yet. Waiting
    /// is bounded; exceeding the bound fails with
    /// [`StockStoreError::LockTimeout`].
    fn lock_stock_row(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<LockedRow>, StockStoreError>> + Send;

    /// Subtracts `quantity` from a locked row.
    ///
    /// Callers check [`LockedRow::covers`] first; the store does not
    /// re-validate non-negativity.
    fn decrement_quantity(
        &mut self,
        row: &LockedRow,
        quantity: Quantity,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send;

    /// Adds `quantity` to the row for (product, warehouse), inserting the row
    /// when it does not exist. Locks the row if this transaction has not.
    fn increment_or_create(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        product_name: &ProductName,
        quantity: Quantity,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send;

    /// Appends one immutable ledger entry.
    fn append_movement(
        &mut self,
        movement: &StockMovement,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send;

    /// Makes every write visible and releases every lock.
    fn commit(self) -> impl Future<Output = Result<(), StockStoreError>> + Send;

    /// Discards every write and releases every lock.
    fn rollback(self) -> impl Future<Output = Result<(), StockStoreError>> + Send;
}

/// Warehouse records the engine and the ranking maintenance read.
pub trait WarehouseCatalog: Send + Sync {
    fn save_warehouse(
        &self,
        warehouse: &Warehouse,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send;

    fn warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<Warehouse>, StockStoreError>> + Send;

    /// Every live warehouse, oldest first.
    fn warehouses(&self) -> impl Future<Output = Result<Vec<Warehouse>, StockStoreError>> + Send;

    /// Every live warehouse except the main one, oldest first.
    fn non_main_warehouses(
        &self,
    ) -> impl Future<Output = Result<Vec<Warehouse>, StockStoreError>> + Send;

    fn main_warehouse(
        &self,
    ) -> impl Future<Output = Result<Option<Warehouse>, StockStoreError>> + Send;
}
