//! In-memory adapters for `StockCore`
//!
//! Implementations of [`stockcore::StockStore`], [`stockcore::WarehouseCatalog`],
//! [`stockcore::RankingCache`] and [`stockcore::Notifier`] that keep all state
//! in process memory. They honour the same contracts as the PostgreSQL
//! adapters, row locks included, which makes them suitable for tests and
//! local development.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod notifier;
mod ranking;
mod store;

pub use notifier::InMemoryNotifier;
pub use ranking::InMemoryRankingCache;
pub use store::{InMemoryStockStore, InMemoryStockTransaction, MemoryStoreConfig};
