//! Search cluster contract
//!
//! The network client for the backing search engine lives outside this crate.
//! [`SearchCluster`] is the narrow surface the lifecycle manager and bulk
//! indexer need; adapters map it onto a concrete client.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use swapindex_core::TypeMode;

use crate::wire::{BulkRequest, BulkResponse};

/// Result type alias for cluster calls
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Status used for failures that never reached the engine (connect, timeout)
pub const TRANSPORT_STATUS: u16 = 0;

/// An error reported by the backing engine, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error_type} (status {status}): {reason}")]
pub struct ClusterError {
    pub status: u16,
    pub error_type: String,
    pub reason: String,
}

impl ClusterError {
    #[must_use]
    pub fn new(status: u16, error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            reason: reason.into(),
        }
    }

    /// A failure below the HTTP layer
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::new(TRANSPORT_STATUS, "transport_error", reason)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Whether retrying the same call later could succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.status, TRANSPORT_STATUS | 429 | 502 | 503 | 504)
    }
}

/// One action of an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    #[must_use]
    pub fn add(index: &str, alias: &str) -> Self {
        Self::Add {
            index: index.to_owned(),
            alias: alias.to_owned(),
        }
    }

    #[must_use]
    pub fn remove(index: &str, alias: &str) -> Self {
        Self::Remove {
            index: index.to_owned(),
            alias: alias.to_owned(),
        }
    }
}

/// Index metadata as listed by the engine's cat-indices call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(rename = "docs.count", default, skip_serializing_if = "Option::is_none")]
    pub docs_count: Option<String>,
}

impl IndexInfo {
    #[must_use]
    pub fn named(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            health: None,
            docs_count: None,
        }
    }
}

/// Summary returned by a native delete-by-query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub version_conflicts: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}

/// Administrative and bulk surface of one backing cluster.
///
/// Calls are blocking. Implementations must be safe to share across the
/// threads used for multi-cluster fan-out.
pub trait SearchCluster: Send + Sync {
    /// Label used in logs and error reports
    fn name(&self) -> &str;

    /// Create a physical index with the given settings/mapping body.
    fn create_index(&self, index: &str, body: &Value) -> ClusterResult<()>;

    /// Bind `alias` to `index` (in addition to any existing bindings).
    fn put_alias(&self, index: &str, alias: &str) -> ClusterResult<()>;

    /// Physical indices currently bound to `alias`; empty when unbound.
    fn get_alias(&self, alias: &str) -> ClusterResult<Vec<String>>;

    fn alias_exists(&self, alias: &str) -> ClusterResult<bool>;

    /// Apply every action in one atomic request.
    fn update_aliases(&self, actions: &[AliasAction]) -> ClusterResult<()>;

    fn delete_indices(&self, indices: &[String]) -> ClusterResult<()>;

    fn cat_indices(&self) -> ClusterResult<Vec<IndexInfo>>;

    /// Document count of an index or alias.
    fn count(&self, index: &str) -> ClusterResult<u64>;

    fn bulk(&self, request: &BulkRequest) -> ClusterResult<BulkResponse>;

    /// Engine-native delete-by-query; the engine resolves `index` if it is an alias.
    ///
    /// `body` is the full request body, `{ "query": <clause> }`.
    fn delete_by_query(&self, index: &str, body: &Value) -> ClusterResult<DeleteByQueryResponse>;
}

/// A cluster handle paired with the document type mode it speaks.
///
/// Every per-cluster loop iterates these uniformly, so a legacy and a modern
/// engine can serve the same index family during a migration.
#[derive(Clone)]
pub struct ClusterTarget {
    pub client: Arc<dyn SearchCluster>,
    pub type_mode: TypeMode,
}

impl ClusterTarget {
    #[must_use]
    pub fn new(client: Arc<dyn SearchCluster>, type_mode: TypeMode) -> Self {
        Self { client, type_mode }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.client.name()
    }
}

impl fmt::Debug for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterTarget")
            .field("cluster", &self.client.name())
            .field("type_mode", &self.type_mode)
            .finish()
    }
}
