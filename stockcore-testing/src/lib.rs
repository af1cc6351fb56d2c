//! Test support for `StockCore` backends
//!
//! - [`contract`]: behavioural suites every [`stockcore::StockStore`] and
//!   [`stockcore::RankingCache`] implementation must pass, plus macros that
//!   expand them into `#[tokio::test]` functions
//! - [`chaos`]: wrappers that inject store, cache and transport failures
//! - [`fixtures`]: small builders for warehouses and seeded stock

#![forbid(
    dead_code,
    invalid_value,
    overflowing_literals,
    unconditional_recursion,
    unused_allocation,
    unsafe_code
)]
#![deny(
    bad_style,
    clippy::allow_attributes,
    deprecated,
    meta_variable_misuse,
    non_ascii_idents,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_code,
    unused_extern_crates,
    unused_imports,
    unused_must_use,
    unused_mut,
    unused_qualifications,
    unused_variables
)]

pub mod chaos;
pub mod contract;
pub mod fixtures;

pub use chaos::{
    ChaosConfig, ChaosNotifier, ChaosRankingCache, ChaosStockStore, ChaosStockStoreExt,
    ChaosTransaction, Probability,
};
pub use contract::{ContractTestFailure, ContractTestResult};
