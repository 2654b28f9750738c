//! Core types and configuration for swapindex
//!
//! This crate provides:
//! - The naming policy (read alias, write alias, per-build physical names)
//! - Index definitions and the legacy/typeless document type mode
//! - The document model produced for every indexed record
//! - Environment-driven settings
//! - Configuration errors

#![forbid(unsafe_code)]

pub mod definition;
pub mod document;
pub mod error;
pub mod naming;
pub mod settings;

// Re-export key types for convenience
pub use definition::{IndexDefinition, TypeMode};
pub use document::{DocId, Document};
pub use error::{ConfigError, ConfigResult};
pub use naming::{BuildTag, IndexNames, WRITE_ALIAS_SUFFIX, validate_index_name};
pub use settings::{DEFAULT_POPULATE_BATCH_SIZE, Settings};
