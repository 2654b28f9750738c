//! Shared fixtures for swapindex tests
//!
//! - [`MemoryCluster`]: an in-memory search cluster with fault injection
//! - [`VecSource`]: an in-memory data source with a settable watermark
//! - [`init_test_tracing`]: route `tracing` output to the test harness

#![forbid(unsafe_code)]

pub mod cluster;
pub mod logging;
pub mod source;

pub use cluster::{AdminOp, MemoryCluster, StoredDoc};
pub use logging::init_test_tracing;
pub use source::{Product, VecSource, product_document, products};
