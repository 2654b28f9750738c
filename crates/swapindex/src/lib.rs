//! Zero-downtime blue-green rebuilds for search indices
//!
//! This crate provides:
//! - [`SearchCluster`] / [`DataSource`]: the contracts for the backing
//!   engine and the source-of-truth store
//! - [`BulkIndexer`]: externally versioned upserts and deletes, fanned out
//!   to every write-bound index on every cluster
//! - [`IndexManager`]: create, populate, switch reads, stop dual writes,
//!   clean up
//! - [`Migration`]: the whole rebuild under a [`MigrationLock`]
//!
//! Naming, index definitions and settings live in [`swapindex_core`] and are
//! re-exported here.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod conflict;
pub mod error;
pub mod indexer;
pub mod lifecycle;
pub mod migration;
pub mod source;
pub mod state;
pub mod wire;

pub use swapindex_core::{
    BuildTag, ConfigError, DocId, Document, IndexDefinition, IndexNames, Settings, TypeMode,
};

pub use cluster::{
    AliasAction, ClusterError, ClusterResult, ClusterTarget, DeleteByQueryResponse, IndexInfo,
    SearchCluster,
};
pub use config::{IndexConfiguration, IndexConfigurationBuilder};
pub use conflict::{BulkOutcome, is_ignorable_conflict};
pub use error::{BulkItemError, ClusterFailure, IndexingError, SwapError, SwapResult};
pub use indexer::{BulkIndexer, BulkReport};
pub use lifecycle::{
    IndexManager, NoProgress, PopulateProgress, PopulateReport, PopulateStatus, ReadSwitch,
};
pub use migration::{
    InProcessLock, Migration, MigrationGuard, MigrationLock, MigrationOptions, MigrationReport,
    MigrationStep,
};
pub use source::{DataSource, RecordBatches};
pub use state::{AliasPhase, AliasState};
pub use wire::{BulkAction, BulkDirective, BulkRequest, BulkResponse, ItemError, ItemResult};
