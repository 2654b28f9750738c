//! Error types for index lifecycle and bulk writes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use swapindex_core::ConfigError;

use crate::cluster::ClusterError;
use crate::migration::MigrationStep;
use crate::wire::BulkAction;

/// Result type alias for swapindex operations
pub type SwapResult<T> = std::result::Result<T, SwapError>;

/// Errors surfaced to the immediate caller. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Invalid configuration, raised at construction
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Non-conflict failures from one bulk call
    #[error(transparent)]
    Indexing(#[from] IndexingError),

    /// The backing engine rejected an administrative or bulk call
    #[error("Cluster {cluster}: {source}")]
    Cluster {
        cluster: String,
        #[source]
        source: ClusterError,
    },

    /// The source-of-truth data store failed
    #[error("Data source error: {0}")]
    Source(String),

    /// More than one cluster failed during a fan-out call
    #[error("{} clusters failed: {}", .0.len(), summarize_failures(.0))]
    FanOut(Vec<ClusterFailure>),

    /// A lifecycle step needs the read alias to be bound first
    #[error("Read alias {alias:?} is not bound to any index")]
    ReadAliasUnbound { alias: String },

    /// A re-sync through the write alias found nothing bound to it
    #[error("Write alias {alias:?} is not bound to any index on cluster {cluster}")]
    WriteAliasUnbound { cluster: String, alias: String },

    /// Another migration holds the lock for this index family
    #[error("Migration lock for {key:?} is already held")]
    MigrationLocked { key: String },

    /// A migration stopped at `step`; earlier steps remain applied
    #[error("Migration failed during {step}: {source}")]
    MigrationFailed {
        step: MigrationStep,
        #[source]
        source: Box<SwapError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SwapError {
    /// Wrap a data source failure
    pub fn data_source(err: impl std::fmt::Display) -> Self {
        Self::Source(err.to_string())
    }

    pub(crate) fn cluster(cluster: &str, source: ClusterError) -> Self {
        Self::Cluster {
            cluster: cluster.to_owned(),
            source,
        }
    }

    /// Returns the error type string (for structured logs and reports)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Indexing(_) => "INDEXING_ERROR",
            Self::Cluster { .. } => "CLUSTER_ERROR",
            Self::Source(_) => "SOURCE_ERROR",
            Self::FanOut(_) => "FAN_OUT_ERROR",
            Self::ReadAliasUnbound { .. } => "READ_ALIAS_UNBOUND",
            Self::WriteAliasUnbound { .. } => "WRITE_ALIAS_UNBOUND",
            Self::MigrationLocked { .. } => "MIGRATION_LOCKED",
            Self::MigrationFailed { .. } => "MIGRATION_FAILED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller could reasonably retry the same call.
    ///
    /// Advisory only; retry policy belongs to the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cluster { source, .. } => source.is_retryable(),
            Self::Indexing(err) => err.is_retryable(),
            Self::FanOut(failures) => failures.iter().all(|f| f.error.is_retryable()),
            Self::MigrationLocked { .. } => true,
            Self::MigrationFailed { source, .. } => source.is_retryable(),
            Self::Config(_)
            | Self::Source(_)
            | Self::ReadAliasUnbound { .. }
            | Self::WriteAliasUnbound { .. }
            | Self::Serialization(_) => false,
        }
    }

    /// The engine error underneath, if this is a cluster rejection
    #[must_use]
    pub fn cluster_error(&self) -> Option<&ClusterError> {
        match self {
            Self::Cluster { source, .. } => Some(source),
            Self::MigrationFailed { source, .. } => source.cluster_error(),
            _ => None,
        }
    }
}

fn summarize_failures(failures: &[ClusterFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.cluster, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One cluster's failure inside a fan-out call
#[derive(Debug)]
pub struct ClusterFailure {
    pub cluster: String,
    pub error: Box<SwapError>,
}

/// A fatal per-item failure from a bulk response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub action: BulkAction,
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    pub error_type: String,
    pub reason: String,
    /// The item exactly as the engine reported it
    pub raw: Value,
}

impl BulkItemError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.status, 429 | 503)
    }
}

impl std::fmt::Display for BulkItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{} [{}] {}: {}",
            self.action,
            self.index,
            self.id.as_deref().unwrap_or("-"),
            self.status,
            self.error_type,
            self.reason
        )
    }
}

/// All fatal item errors from one bulk call against one cluster
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Errors indexing on {cluster}: {}", join_items(.errors))]
pub struct IndexingError {
    pub cluster: String,
    pub errors: Vec<BulkItemError>,
}

impl IndexingError {
    /// Ids of the offending documents, in response order
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.errors.iter().filter_map(|e| e.id.as_deref()).collect()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(BulkItemError::is_retryable)
    }
}

fn join_items(errors: &[BulkItemError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
