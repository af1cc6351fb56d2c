//! Example applications built on the `StockCore` inventory engine

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Fulfillment example: a regional warehouse network receiving, rebalancing
/// and shipping stock
pub mod fulfillment;
