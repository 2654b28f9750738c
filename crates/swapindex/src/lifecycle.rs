//! Blue-green index lifecycle
//!
//! Lifecycle state lives in the cluster's alias bindings, not in this
//! process. Every step re-reads the bindings it needs, so a migration
//! interrupted by a restart can be resumed by re-running the failed step.
//!
//! ```text
//! Steady ──create_index──▶ DualWrite ──populate_index──▶ DualWrite
//!    ▲                                                      │
//!    └──stop_dual_writes◀──DualWrite (new read)◀──switch_read_index
//! ```
//!
//! Steps are not serialized against each other here; see
//! [`crate::migration`] for a runner that holds a lock for the duration.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cluster::{AliasAction, ClusterTarget};
use crate::config::IndexConfiguration;
use crate::error::{SwapError, SwapResult};
use crate::indexer::{BulkIndexer, BulkReport};
use crate::state::AliasState;

/// Progress snapshot passed to [`PopulateProgress`] after every batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PopulateStatus {
    pub batch_number: usize,
    pub records_in_batch: usize,
    pub records_total: usize,
    /// Rough completion estimate; the denominator is the read index's count,
    /// which can differ from what the new index will end up holding
    pub estimated_percent: Option<f64>,
}

/// Receives progress during population
pub trait PopulateProgress: Send + Sync {
    fn on_batch(&self, status: &PopulateStatus);
}

/// No-op progress tracker
pub struct NoProgress;

impl PopulateProgress for NoProgress {
    fn on_batch(&self, _status: &PopulateStatus) {}
}

/// Result of one population run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateReport {
    /// Physical index written, or the write alias for a re-sync
    pub target: String,
    pub batches: usize,
    pub records: usize,
    pub bulk: BulkReport,
    pub elapsed_ms: u64,
}

/// Outcome of a read cutover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSwitch {
    /// Indices the read alias resolved to before the swap
    pub previous: Vec<String>,
    pub current: String,
}

/// `batch_size * batch_number / total * 100`, capped at 100.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_percent(batch_size: usize, batch_number: usize, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let done = batch_size.saturating_mul(batch_number) as f64;
    Some((done / total as f64 * 100.0).min(100.0))
}

/// Drives the lifecycle of one index family on one cluster.
pub struct IndexManager<R> {
    config: Arc<IndexConfiguration<R>>,
    target: ClusterTarget,
    indexer: BulkIndexer<R>,
}

impl<R> std::fmt::Debug for IndexManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("read_alias", &self.config.read_alias())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<R> IndexManager<R> {
    /// Manage the family on the first configured cluster.
    #[must_use]
    pub fn new(config: Arc<IndexConfiguration<R>>) -> Self {
        let target = config.primary_cluster().clone();
        Self::for_target(config, target)
    }

    #[must_use]
    pub fn for_target(config: Arc<IndexConfiguration<R>>, target: ClusterTarget) -> Self {
        let indexer = BulkIndexer::new(Arc::clone(&config));
        Self {
            config,
            target,
            indexer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexConfiguration<R> {
        &self.config
    }

    #[must_use]
    pub const fn target(&self) -> &ClusterTarget {
        &self.target
    }

    #[must_use]
    pub const fn indexer(&self) -> &BulkIndexer<R> {
        &self.indexer
    }

    fn cluster_err(&self) -> impl Fn(crate::cluster::ClusterError) -> SwapError + '_ {
        move |e| SwapError::cluster(self.target.name(), e)
    }

    fn bound_to(&self, alias: &str) -> SwapResult<Vec<String>> {
        if !self
            .target
            .client
            .alias_exists(alias)
            .map_err(self.cluster_err())?
        {
            return Ok(Vec::new());
        }
        self.target
            .client
            .get_alias(alias)
            .map_err(self.cluster_err())
    }

    /// Create `{read_alias}_{build_tag}` and add it to the write alias.
    ///
    /// The alias is only touched once creation succeeded. Returns the
    /// physical index name.
    pub fn create_index(&self, build_tag: &str) -> SwapResult<String> {
        let index = self.config.names().physical_name(build_tag)?;
        let body = self.config.definition().body_for(&self.target.type_mode);
        let client = &self.target.client;

        client
            .create_index(&index, &body)
            .map_err(self.cluster_err())?;
        client
            .put_alias(&index, self.config.write_alias())
            .map_err(self.cluster_err())?;

        tracing::info!(
            target: "swapindex.lifecycle",
            cluster = self.target.name(),
            index = %index,
            write_alias = self.config.write_alias(),
            "created index and added it to the write alias"
        );
        Ok(index)
    }

    /// Stream the data source into the build's index, or into whatever the
    /// write alias resolves to when `build_tag` is `None`.
    pub fn populate_index(
        &self,
        build_tag: Option<&str>,
        batch_size: usize,
    ) -> SwapResult<PopulateReport> {
        self.populate_index_with_progress(build_tag, batch_size, &NoProgress)
    }

    /// [`populate_index`](Self::populate_index) with a progress callback.
    ///
    /// A failing batch aborts the run; batches already written stay applied.
    /// A re-sync (`build_tag` of `None`) fails up front with
    /// [`SwapError::WriteAliasUnbound`] when the write alias has no index.
    pub fn populate_index_with_progress(
        &self,
        build_tag: Option<&str>,
        batch_size: usize,
        progress: &dyn PopulateProgress,
    ) -> SwapResult<PopulateReport> {
        let started = Instant::now();
        let index = build_tag
            .map(|tag| self.config.names().physical_name(tag))
            .transpose()?;
        if index.is_none() && self.bound_to(self.config.write_alias())?.is_empty() {
            return Err(SwapError::WriteAliasUnbound {
                cluster: self.target.name().to_owned(),
                alias: self.config.write_alias().to_owned(),
            });
        }
        let batch_size = batch_size.max(1);
        let log_every = self.config.settings().progress_every.max(1);
        let total = self.progress_denominator()?;

        let mut report = PopulateReport {
            target: index
                .clone()
                .unwrap_or_else(|| self.config.write_alias().to_owned()),
            batches: 0,
            records: 0,
            bulk: BulkReport::default(),
            elapsed_ms: 0,
        };

        for batch in self.config.source().batches(batch_size) {
            let batch = batch?;
            let written = self
                .indexer
                .index_batch_on(&self.target, &batch, index.as_deref())?;

            report.batches += 1;
            report.records += batch.len();
            report.bulk.merge(&written);

            let status = PopulateStatus {
                batch_number: report.batches,
                records_in_batch: batch.len(),
                records_total: report.records,
                estimated_percent: estimate_percent(batch_size, report.batches, total),
            };
            progress.on_batch(&status);
            if report.batches % log_every == 0 {
                tracing::info!(
                    target: "swapindex.lifecycle",
                    index = %report.target,
                    batch = status.batch_number,
                    records = status.records_total,
                    estimated_percent = ?status.estimated_percent,
                    "indexed batch"
                );
            }
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            target: "swapindex.lifecycle",
            index = %report.target,
            batches = report.batches,
            records = report.records,
            ignored_conflicts = report.bulk.ignored_conflicts,
            elapsed_ms = report.elapsed_ms,
            "population finished"
        );
        Ok(report)
    }

    /// Document count behind the read alias, or the source's own estimate
    /// when nothing is readable yet.
    fn progress_denominator(&self) -> SwapResult<u64> {
        let read_alias = self.config.read_alias();
        let count = if self.bound_to(read_alias)?.is_empty() {
            0
        } else {
            self.target
                .client
                .count(read_alias)
                .map_err(self.cluster_err())?
        };
        if count > 0 {
            return Ok(count);
        }
        self.config.source().approximate_count()
    }

    /// Point the read alias at the build's index in one atomic alias update.
    ///
    /// If the target index does not exist the engine's own error is returned
    /// and the read alias is left as it was.
    pub fn switch_read_index(&self, build_tag: &str) -> SwapResult<ReadSwitch> {
        let read_alias = self.config.read_alias();
        let current = self.config.names().physical_name(build_tag)?;
        let previous = self.bound_to(read_alias)?;

        if previous == [current.as_str()] {
            tracing::info!(
                target: "swapindex.lifecycle",
                cluster = self.target.name(),
                index = %current,
                "read alias already points at index; nothing to do"
            );
            return Ok(ReadSwitch { previous, current });
        }

        let mut actions: Vec<AliasAction> = previous
            .iter()
            .filter(|old| **old != current)
            .map(|old| AliasAction::remove(old, read_alias))
            .collect();
        actions.push(AliasAction::add(&current, read_alias));
        self.target
            .client
            .update_aliases(&actions)
            .map_err(self.cluster_err())?;

        tracing::info!(
            target: "swapindex.lifecycle",
            cluster = self.target.name(),
            from = ?previous,
            to = %current,
            "switched read alias"
        );
        Ok(ReadSwitch { previous, current })
    }

    /// Remove the write alias from every index except the one being read.
    ///
    /// Returns the indices that stopped receiving writes; empty when there
    /// was nothing to do.
    pub fn stop_dual_writes(&self) -> SwapResult<Vec<String>> {
        let read = self.read_bound()?;
        let write_alias = self.config.write_alias();
        tracing::info!(
            target: "swapindex.lifecycle",
            cluster = self.target.name(),
            current = ?read,
            "stopping dual writes"
        );

        let retired: Vec<String> = self
            .bound_to(write_alias)?
            .into_iter()
            .filter(|index| !read.contains(index))
            .collect();
        if retired.is_empty() {
            tracing::info!(
                target: "swapindex.lifecycle",
                cluster = self.target.name(),
                "no write-bound index other than the read index; nothing to do"
            );
            return Ok(retired);
        }

        let actions: Vec<AliasAction> = retired
            .iter()
            .map(|index| AliasAction::remove(index, write_alias))
            .collect();
        self.target
            .client
            .update_aliases(&actions)
            .map_err(self.cluster_err())?;

        tracing::info!(
            target: "swapindex.lifecycle",
            cluster = self.target.name(),
            retired = ?retired,
            "stopped writes to old indices"
        );
        Ok(retired)
    }

    /// Delete every physical index of the family except the read index.
    ///
    /// Irreversible. Run [`stop_dual_writes`](Self::stop_dual_writes) first;
    /// an index still bound to the write alias is deleted all the same.
    ///
    /// Candidates are matched by the `<read>_` prefix. An index that could
    /// belong to a longer family (`products_archive_v1` next to `products`)
    /// is spared while that family's read alias exists on the cluster. Once
    /// that alias is gone its indices are indistinguishable from this
    /// family's and are deleted too.
    pub fn cleanup_old_indices(&self) -> SwapResult<Vec<String>> {
        let read = self.read_bound()?;
        let names = self.config.names();

        let mut doomed = Vec::new();
        for info in self.target.client.cat_indices().map_err(self.cluster_err())? {
            let index = info.index;
            if !names.owns_physical_name(&index) || read.contains(&index) {
                continue;
            }
            if let Some(owner) = self.nested_owner(&index)? {
                tracing::debug!(
                    target: "swapindex.lifecycle",
                    cluster = self.target.name(),
                    index = %index,
                    owner = %owner,
                    "sparing index of a nested family"
                );
                continue;
            }
            doomed.push(index);
        }
        if doomed.is_empty() {
            tracing::info!(
                target: "swapindex.lifecycle",
                cluster = self.target.name(),
                "no old indices to clean up"
            );
            return Ok(doomed);
        }

        let still_writing: Vec<&String> = {
            let write = self.bound_to(self.config.write_alias())?;
            doomed.iter().filter(|index| write.contains(index)).collect()
        };
        if !still_writing.is_empty() {
            tracing::warn!(
                target: "swapindex.lifecycle",
                cluster = self.target.name(),
                indices = ?still_writing,
                "deleting indices that are still write-bound"
            );
        }

        self.target
            .client
            .delete_indices(&doomed)
            .map_err(self.cluster_err())?;
        tracing::info!(
            target: "swapindex.lifecycle",
            cluster = self.target.name(),
            deleted = ?doomed,
            "deleted old indices"
        );
        Ok(doomed)
    }

    /// Query the family's current alias bindings.
    pub fn alias_state(&self) -> SwapResult<AliasState> {
        let names = self.config.names();
        let mut physical_indices: Vec<String> = self
            .target
            .client
            .cat_indices()
            .map_err(self.cluster_err())?
            .into_iter()
            .map(|info| info.index)
            .filter(|index| names.owns_physical_name(index))
            .collect();
        physical_indices.sort();

        Ok(AliasState {
            cluster: self.target.name().to_owned(),
            read_alias: names.read_alias().to_owned(),
            write_alias: names.write_alias().to_owned(),
            read_indices: self.bound_to(names.read_alias())?,
            write_indices: self.bound_to(names.write_alias())?,
            physical_indices,
        })
    }

    /// The first existing read alias of a longer family that could own `index`.
    fn nested_owner(&self, index: &str) -> SwapResult<Option<String>> {
        for alias in self.config.names().nested_read_aliases(index) {
            if self
                .target
                .client
                .alias_exists(&alias)
                .map_err(self.cluster_err())?
            {
                return Ok(Some(alias));
            }
        }
        Ok(None)
    }

    fn read_bound(&self) -> SwapResult<Vec<String>> {
        let read = self.bound_to(self.config.read_alias())?;
        if read.is_empty() {
            return Err(SwapError::ReadAliasUnbound {
                alias: self.config.read_alias().to_owned(),
            });
        }
        Ok(read)
    }
}
