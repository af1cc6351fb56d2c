//! PostgreSQL adapters for `StockCore`
//!
//! [`PostgresStockStore`] keeps stock rows, the movement ledger and the
//! warehouse catalog in PostgreSQL and locks rows with `SELECT ... FOR
//! UPDATE`. [`PostgresRankingCache`] keeps the per-zip rankings in the
//! `warehouse_ranks` table and [`PostgresNotifier`] publishes quantity
//! changes with `pg_notify`.
//!
//! All three share one connection pool. Run [`PostgresStockStore::migrate`]
//! once before use.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::num::NonZeroU32;
use std::time::Duration;

use nutype::nutype;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, query};
use stockcore::{Operation, StockStoreError};
use thiserror::Error;
use tracing::{error, warn};

mod notifier;
mod ranking;
mod store;

pub use notifier::{NotificationListener, PostgresNotifier};
pub use ranking::PostgresRankingCache;
pub use store::PostgresStockTransaction;

#[derive(Debug, Error)]
pub enum PostgresStoreError {
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    #[error("postgres migration failed")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    #[error("postgres ping failed")]
    PingFailed(#[source] sqlx::Error),

    #[error("failed to listen on {channel}")]
    ListenFailed {
        channel: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Maximum number of database connections in the pool.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(NonZeroU32);

/// Connection pool and per-transaction limits.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
    /// Longest a transaction waits for a row lock (default: 5 seconds)
    pub lock_timeout: Duration,
    /// Longest a single statement may run (default: 30 seconds)
    pub statement_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            lock_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Pool<Postgres>,
    config: PostgresConfig,
}

impl PostgresStockStore {
    /// Connects with the default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let connection_string = connection_string.into();
        let max_connections: NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        Ok(Self { pool, config })
    }

    /// Wraps an existing pool, e.g. to share it with the ranking cache and
    /// notifier.
    pub fn from_pool(pool: Pool<Postgres>, config: PostgresConfig) -> Self {
        Self { pool, config }
    }

    pub const fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    pub const fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// A ranking cache on the same pool.
    pub fn ranking_cache(&self) -> PostgresRankingCache {
        PostgresRankingCache::new(self.pool.clone())
    }

    /// A notifier on the same pool.
    pub fn notifier(&self) -> PostgresNotifier {
        PostgresNotifier::new(self.pool.clone())
    }

    pub async fn ping(&self) -> Result<(), PostgresStoreError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(PostgresStoreError::PingFailed)
    }

    pub async fn migrate(&self) -> Result<(), PostgresStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresStoreError::MigrationFailed)
    }
}

fn sqlstate(error: &sqlx::Error) -> Option<String> {
    match error {
        sqlx::Error::Database(db_error) => db_error.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Translates a driver error into the store's error vocabulary.
///
/// - `55P03` lock_not_available: [`StockStoreError::LockTimeout`]
/// - `40001` serialization_failure, `40P01` deadlock_detected:
///   [`StockStoreError::TransactionConflict`]
/// - `23xxx` integrity violations: [`StockStoreError::ConstraintViolation`]
fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> StockStoreError {
    match sqlstate(&error).as_deref() {
        Some("55P03") => {
            warn!(
                operation = %operation,
                "[postgres.lock_timeout] row lock not granted in time"
            );
            StockStoreError::LockTimeout { operation }
        }
        Some("40001" | "40P01") => {
            warn!(
                error = %error,
                operation = %operation,
                "[postgres.transaction_conflict] transaction aborted by the server"
            );
            StockStoreError::TransactionConflict { operation }
        }
        Some(code) if code.starts_with("23") => {
            warn!(
                error = %error,
                operation = %operation,
                "[postgres.constraint_violation] write rejected by constraint"
            );
            StockStoreError::ConstraintViolation {
                operation,
                detail: error.to_string(),
            }
        }
        _ => {
            error!(
                error = %error,
                operation = %operation,
                "[postgres.database_error] database operation failed"
            );
            StockStoreError::StoreFailure { operation }
        }
    }
}

fn corrupted(operation: Operation, detail: impl std::fmt::Display) -> StockStoreError {
    error!(
        operation = %operation,
        detail = %detail,
        "[postgres.corrupted_row] stored value failed validation"
    );
    StockStoreError::Corrupted {
        operation,
        detail: detail.to_string(),
    }
}
