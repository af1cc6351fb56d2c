use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use stockcore::{
    LockedRow, MovementQuery, Operation, ProductId, ProductName, Quantity, StockMovement,
    StockRowId, StockStore, StockStoreError, StockTransaction, Timestamp, Warehouse,
    WarehouseCatalog, WarehouseId, WarehouseProduct, WarehouseStock,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument, warn};

type RowKey = (ProductId, WarehouseId);

/// Settings for [`InMemoryStockStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// How long a transaction waits for a row lock before giving up.
    pub lock_timeout: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    warehouses: HashMap<WarehouseId, Warehouse>,
    stock: HashMap<RowKey, WarehouseProduct>,
    movements: Vec<StockMovement>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    // One async mutex per (product, warehouse) pair, created on first use.
    row_locks: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    fn read(&self, operation: Operation) -> Result<RwLockReadGuard<'_, Tables>, StockStoreError> {
        self.tables
            .read()
            .map_err(|_| StockStoreError::StoreFailure { operation })
    }

    fn write(&self, operation: Operation) -> Result<RwLockWriteGuard<'_, Tables>, StockStoreError> {
        self.tables
            .write()
            .map_err(|_| StockStoreError::StoreFailure { operation })
    }

    fn row_lock(
        &self,
        key: RowKey,
        operation: Operation,
    ) -> Result<Arc<tokio::sync::Mutex<()>>, StockStoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StockStoreError::StoreFailure { operation })?;
        Ok(Arc::clone(locks.entry(key).or_default()))
    }
}

/// Thread-safe in-memory stock store and warehouse catalog.
///
/// Clones share the same data. Row locks are per-row async mutexes held by
/// the transaction until it commits, rolls back or is dropped; writes are
/// staged in the transaction and applied atomically on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
    config: MemoryStoreConfig,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            shared: Arc::default(),
            config,
        }
    }

    pub const fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }
}

impl StockStore for InMemoryStockStore {
    type Transaction = InMemoryStockTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StockStoreError> {
        Ok(InMemoryStockTransaction {
            shared: Arc::clone(&self.shared),
            lock_timeout: self.config.lock_timeout,
            guards: HashMap::new(),
            writes: Vec::new(),
        })
    }

    async fn total_quantity(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        let operation = Operation::ReadStock;
        let tables = self.shared.read(operation)?;
        tables
            .stock
            .values()
            .filter(|row| row.product_id == product_id)
            .try_fold(0i64, |total, row| total.checked_add(row.quantity))
            .ok_or_else(|| StockStoreError::ConstraintViolation {
                operation,
                detail: format!("total quantity of product {product_id} overflows"),
            })
    }

    async fn stock_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<WarehouseStock>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadStock)?;
        let mut stock: Vec<WarehouseStock> = tables
            .stock
            .values()
            .filter(|row| row.product_id == product_id)
            .filter_map(|row| {
                let warehouse = tables.warehouses.get(&row.warehouse_id)?;
                (!warehouse.is_deleted()).then(|| WarehouseStock {
                    warehouse_id: warehouse.id,
                    zip_code: warehouse.zip_code.clone(),
                    quantity: row.quantity,
                })
            })
            .collect();
        stock.sort_by_key(|s| s.warehouse_id);
        Ok(stock)
    }

    async fn stock_row(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<WarehouseProduct>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadStock)?;
        Ok(tables.stock.get(&(product_id, warehouse_id)).cloned())
    }

    async fn stock_rows_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<WarehouseProduct>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadStock)?;
        let mut rows: Vec<_> = tables
            .stock
            .values()
            .filter(|row| row.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.warehouse_id);
        Ok(rows)
    }

    async fn stock_rows_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<WarehouseProduct>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadStock)?;
        let mut rows: Vec<_> = tables
            .stock
            .values()
            .filter(|row| row.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.product_id);
        Ok(rows)
    }

    async fn movements(&self, query: MovementQuery) -> Result<Vec<StockMovement>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadMovements)?;
        Ok(tables
            .movements
            .iter()
            .filter(|movement| query.matches(movement))
            .cloned()
            .collect())
    }
}

impl WarehouseCatalog for InMemoryStockStore {
    async fn save_warehouse(&self, warehouse: &Warehouse) -> Result<(), StockStoreError> {
        let mut tables = self.shared.write(Operation::SaveWarehouse)?;
        if tables.warehouses.contains_key(&warehouse.id) {
            return Err(StockStoreError::ConstraintViolation {
                operation: Operation::SaveWarehouse,
                detail: format!("warehouse {} already exists", warehouse.id),
            });
        }
        if warehouse.is_main
            && !warehouse.is_deleted()
            && tables
                .warehouses
                .values()
                .any(|w| w.is_main && !w.is_deleted())
        {
            return Err(StockStoreError::ConstraintViolation {
                operation: Operation::SaveWarehouse,
                detail: "only one live main warehouse is allowed".to_string(),
            });
        }
        tables.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(())
    }

    async fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StockStoreError> {
        let tables = self.shared.read(Operation::ReadWarehouses)?;
        Ok(tables.warehouses.get(&warehouse_id).cloned())
    }

    async fn warehouses(&self) -> Result<Vec<Warehouse>, StockStoreError> {
        live_warehouses(&self.shared, |_| true)
    }

    async fn non_main_warehouses(&self) -> Result<Vec<Warehouse>, StockStoreError> {
        live_warehouses(&self.shared, |w| !w.is_main)
    }

    async fn main_warehouse(&self) -> Result<Option<Warehouse>, StockStoreError> {
        Ok(live_warehouses(&self.shared, |w| w.is_main)?.into_iter().next())
    }
}

fn live_warehouses(
    shared: &Shared,
    keep: impl Fn(&Warehouse) -> bool,
) -> Result<Vec<Warehouse>, StockStoreError> {
    let tables = shared.read(Operation::ReadWarehouses)?;
    let mut warehouses: Vec<Warehouse> = tables
        .warehouses
        .values()
        .filter(|w| !w.is_deleted() && keep(w))
        .cloned()
        .collect();
    warehouses.sort_by_key(|w| (w.created_at, w.id));
    Ok(warehouses)
}

#[derive(Debug)]
enum PendingWrite {
    Adjust {
        key: RowKey,
        delta: i64,
        at: Timestamp,
    },
    Insert(WarehouseProduct),
    Movement(StockMovement),
}

/// Unit of work over an [`InMemoryStockStore`].
#[derive(Debug)]
pub struct InMemoryStockTransaction {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: Vec<PendingWrite>,
}

impl InMemoryStockTransaction {
    async fn acquire(&mut self, key: RowKey, operation: Operation) -> Result<(), StockStoreError> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        let mutex = self.shared.row_lock(key, operation)?;
        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                warn!(
                    product_id = %key.0,
                    warehouse_id = %key.1,
                    "[memory.lock_stock_row] lock wait exceeded {:?}",
                    self.lock_timeout
                );
                StockStoreError::LockTimeout { operation }
            })?;
        self.guards.insert(key, guard);
        Ok(())
    }

    /// The row as this transaction sees it: committed state plus its own
    /// staged writes.
    fn staged_row(
        &self,
        key: RowKey,
        operation: Operation,
    ) -> Result<Option<(ProductName, i64)>, StockStoreError> {
        let tables = self.shared.read(operation)?;
        let mut row = tables
            .stock
            .get(&key)
            .map(|row| (row.product_name.clone(), row.quantity));
        drop(tables);

        for write in &self.writes {
            match write {
                PendingWrite::Insert(inserted)
                    if (inserted.product_id, inserted.warehouse_id) == key =>
                {
                    row = Some((inserted.product_name.clone(), inserted.quantity));
                }
                PendingWrite::Adjust { key: k, delta, .. } if *k == key => {
                    if let Some((_, quantity)) = row.as_mut() {
                        *quantity = quantity.checked_add(*delta).ok_or_else(|| {
                            StockStoreError::ConstraintViolation {
                                operation,
                                detail: format!(
                                    "product {} in warehouse {} would exceed the quantity range",
                                    key.0, key.1
                                ),
                            }
                        })?;
                    }
                }
                _ => {}
            }
        }
        Ok(row)
    }
}

impl StockTransaction for InMemoryStockTransaction {
    #[instrument(name = "memory.lock_stock_row", skip(self))]
    async fn lock_stock_row(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<LockedRow>, StockStoreError> {
        let key = (product_id, warehouse_id);
        if self.staged_row(key, Operation::LockStockRow)?.is_none() {
            return Ok(None);
        }

        self.acquire(key, Operation::LockStockRow).await?;

        // Re-read under the lock; the holder we waited for may have changed it.
        Ok(self
            .staged_row(key, Operation::LockStockRow)?
            .map(|(name, quantity)| LockedRow::new(product_id, warehouse_id, name, quantity)))
    }

    async fn decrement_quantity(
        &mut self,
        row: &LockedRow,
        quantity: Quantity,
        at: Timestamp,
    ) -> Result<(), StockStoreError> {
        let key = (row.product_id(), row.warehouse_id());
        if !self.guards.contains_key(&key) {
            return Err(StockStoreError::RowNotLocked {
                operation: Operation::DecrementQuantity,
                product_id: key.0,
                warehouse_id: key.1,
            });
        }
        self.writes.push(PendingWrite::Adjust {
            key,
            delta: -quantity.get(),
            at,
        });
        Ok(())
    }

    async fn increment_or_create(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        product_name: &ProductName,
        quantity: Quantity,
        at: Timestamp,
    ) -> Result<(), StockStoreError> {
        let key = (product_id, warehouse_id);
        self.acquire(key, Operation::IncrementOrCreate).await?;

        let write = if self.staged_row(key, Operation::IncrementOrCreate)?.is_some() {
            PendingWrite::Adjust {
                key,
                delta: quantity.get(),
                at,
            }
        } else {
            PendingWrite::Insert(WarehouseProduct {
                id: StockRowId::generate(),
                warehouse_id,
                product_id,
                product_name: product_name.clone(),
                quantity: quantity.get(),
                created_at: at,
                updated_at: at,
            })
        };
        self.writes.push(write);
        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), StockStoreError> {
        self.writes.push(PendingWrite::Movement(movement.clone()));
        Ok(())
    }

    #[instrument(name = "memory.commit", skip(self), fields(writes = self.writes.len()))]
    async fn commit(self) -> Result<(), StockStoreError> {
        let operation = Operation::CommitTransaction;
        let mut tables = self.shared.write(operation)?;

        // Validate everything before touching the tables so a rejected
        // commit leaves no trace.
        let mut resulting: HashMap<RowKey, i64> = HashMap::new();
        for write in &self.writes {
            match write {
                PendingWrite::Insert(row) => {
                    resulting.insert((row.product_id, row.warehouse_id), row.quantity);
                }
                PendingWrite::Adjust { key, delta, .. } => {
                    let current = match resulting.get(key) {
                        Some(quantity) => *quantity,
                        None => tables
                            .stock
                            .get(key)
                            .map(|row| row.quantity)
                            .ok_or(StockStoreError::StoreFailure { operation })?,
                    };
                    let updated = current.checked_add(*delta).ok_or_else(|| {
                        StockStoreError::ConstraintViolation {
                            operation,
                            detail: format!(
                                "product {} in warehouse {} would exceed the quantity range",
                                key.0, key.1
                            ),
                        }
                    })?;
                    resulting.insert(*key, updated);
                }
                PendingWrite::Movement(movement) => {
                    if tables.movements.iter().any(|m| m.id == movement.id) {
                        return Err(StockStoreError::ConstraintViolation {
                            operation,
                            detail: format!("movement {} already recorded", movement.id),
                        });
                    }
                }
            }
        }
        if let Some(((product_id, warehouse_id), quantity)) =
            resulting.iter().find(|(_, quantity)| **quantity < 0)
        {
            return Err(StockStoreError::ConstraintViolation {
                operation,
                detail: format!(
                    "product {product_id} in warehouse {warehouse_id} would hold {quantity}"
                ),
            });
        }

        for write in &self.writes {
            match write {
                PendingWrite::Insert(row) => {
                    tables
                        .stock
                        .insert((row.product_id, row.warehouse_id), row.clone());
                }
                PendingWrite::Adjust { key, at, .. } => {
                    // Final values were range-checked above.
                    if let (Some(row), Some(quantity)) = (tables.stock.get_mut(key), resulting.get(key)) {
                        row.quantity = *quantity;
                        row.updated_at = *at;
                    }
                }
                PendingWrite::Movement(movement) => tables.movements.push(movement.clone()),
            }
        }
        drop(tables);

        debug!("[memory.commit] transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<(), StockStoreError> {
        debug!(
            discarded = self.writes.len(),
            "[memory.rollback] transaction rolled back"
        );
        Ok(())
    }
}
