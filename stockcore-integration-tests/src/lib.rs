//! Integration tests for `StockCore`
//!
//! This crate contains integration tests that drive the transfer engine and
//! warehouse registry end to end over the in-memory adapters, including
//! concurrency and failure injection.

// This is a test-only crate
#![cfg(test)]
