//! Error types for `StockCore`.
//!
//! Each subsystem gets its own error enum so callers can tell a missing row
//! from a lock timeout from an unreachable cache:
//!
//! - **`InvalidZipCode`**: a zip code that does not parse as an integer
//! - **`StockStoreError`**: persistence failures, tagged with the [`Operation`]
//!   that failed
//! - **`RankingCacheError`**: the ranking cache could not be read or written
//! - **`NotifyError`**: a change notification could not be delivered
//! - **`AllocationError`**: the requested quantity cannot be sourced
//! - **`TransferError`**: what a move-in or move-out returns to its caller
//! - **`CatalogError`**: warehouse registration and ranking maintenance
//!
//! Transient failures (`LockTimeout`, `TransactionConflict`) are reported as
//! such all the way up so the engine can retry the whole request.

use thiserror::Error;

use crate::types::{ProductId, Quantity, WarehouseId};

/// Store operation being performed when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opening a unit of work.
    BeginTransaction,
    /// Taking the exclusive lock on a stock row.
    LockStockRow,
    /// Subtracting units from a locked row.
    DecrementQuantity,
    /// Adding units to a row, creating it when absent.
    IncrementOrCreate,
    /// Appending a ledger entry.
    AppendMovement,
    /// Committing a unit of work.
    CommitTransaction,
    /// Rolling back a unit of work.
    RollbackTransaction,
    /// Reading stock rows or quantities.
    ReadStock,
    /// Reading ledger entries.
    ReadMovements,
    /// Reading warehouses.
    ReadWarehouses,
    /// Persisting a warehouse.
    SaveWarehouse,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::LockStockRow => write!(f, "lock_stock_row"),
            Self::DecrementQuantity => write!(f, "decrement_quantity"),
            Self::IncrementOrCreate => write!(f, "increment_or_create"),
            Self::AppendMovement => write!(f, "append_movement"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
            Self::RollbackTransaction => write!(f, "rollback_transaction"),
            Self::ReadStock => write!(f, "read_stock"),
            Self::ReadMovements => write!(f, "read_movements"),
            Self::ReadWarehouses => write!(f, "read_warehouses"),
            Self::SaveWarehouse => write!(f, "save_warehouse"),
        }
    }
}

/// Error returned by `StockStore`, `StockTransaction` and `WarehouseCatalog`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockStoreError {
    /// Waiting for a row lock exceeded the configured bound.
    #[error("{operation} timed out waiting for a row lock")]
    LockTimeout { operation: Operation },

    /// The backend aborted the unit of work because of a concurrent one.
    #[error("{operation} aborted by a conflicting transaction")]
    TransactionConflict { operation: Operation },

    /// A mutation was attempted on a row this unit of work has not locked.
    #[error("{operation} requires the lock on product {product_id} in warehouse {warehouse_id}")]
    RowNotLocked {
        operation: Operation,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    },

    /// The backend rejected a write that would break a stored constraint.
    #[error("{operation} violated a store constraint: {detail}")]
    ConstraintViolation { operation: Operation, detail: String },

    /// A stored value could not be turned back into a domain type.
    #[error("{operation} read a malformed row: {detail}")]
    Corrupted { operation: Operation, detail: String },

    /// Any other backend failure.
    #[error("{operation} operation failed")]
    StoreFailure { operation: Operation },
}

impl StockStoreError {
    /// Whether retrying the whole request may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::TransactionConflict { .. }
        )
    }
}

/// A zip code that is not a plain integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid zip code {0:?}")]
pub struct InvalidZipCode(pub String);

/// Error returned by a `RankingCache`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingCacheError {
    /// The cache could not be reached or refused the command.
    #[error("ranking cache unavailable during {operation}: {detail}")]
    Unavailable {
        operation: &'static str,
        detail: String,
    },
}

/// Error returned by a `Notifier`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The payload could not be serialized.
    #[error("failed to encode notification payload: {0}")]
    Encode(String),

    /// The transport did not accept the message.
    #[error("failed to publish to topic {topic}: {detail}")]
    Publish { topic: String, detail: String },
}

/// Error returned by the allocation algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The candidates together hold fewer units than requested.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Quantity, available: i64 },
}

/// Error returned by the transfer engine.
///
/// Mirrors the failure classes a caller has to act on:
///
/// - **`InvalidInput`**: fix the request
/// - **`NotFound`**: the product or warehouse does not exist
/// - **`InsufficientStock`**: not enough units; nothing was changed
/// - **`LockTimeout`** / **`TransactionConflict`**: transient, retry later
/// - **`Store`**: the backend failed; nothing was committed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: Quantity,
        available: i64,
    },

    #[error("timed out waiting for a stock lock during {operation}")]
    LockTimeout { operation: Operation },

    #[error("transaction aborted by a concurrent transfer during {operation}")]
    TransactionConflict { operation: Operation },

    #[error("{request} failed: {source}")]
    Store {
        request: &'static str,
        #[source]
        source: StockStoreError,
    },
}

impl TransferError {
    /// Whether the engine's retry policy applies.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::TransactionConflict { .. }
        )
    }

    /// Lifts a store error into the transfer taxonomy, keeping transient
    /// failures distinguishable.
    pub fn from_store(request: &'static str, error: StockStoreError) -> Self {
        match error {
            StockStoreError::LockTimeout { operation } => Self::LockTimeout { operation },
            StockStoreError::TransactionConflict { operation } => {
                Self::TransactionConflict { operation }
            }
            source => Self::Store { request, source },
        }
    }
}

/// Error returned by warehouse registration and ranking maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("a main warehouse already exists: {0}")]
    MainWarehouseExists(WarehouseId),

    #[error("warehouse {0} not found")]
    WarehouseNotFound(WarehouseId),

    #[error(transparent)]
    Store(#[from] StockStoreError),

    #[error(transparent)]
    Ranking(#[from] RankingCacheError),
}
