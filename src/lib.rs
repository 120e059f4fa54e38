//! Sous - data-change events and search indexing
//!
//! The mutation → event → search pipeline of a recipe and meal planning
//! backend: publisher and consumer fabrics over several message brokers,
//! a scheduler that finds stale rows, and an indexer that keeps the search
//! index in step with the system of record.

pub mod bus;
pub mod codec;
pub mod config;
pub mod indexing;
pub mod search;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod utils;
