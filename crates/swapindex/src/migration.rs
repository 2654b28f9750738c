//! Serialized blue-green migrations
//!
//! Lifecycle steps race on alias state when two operators run them at once.
//! [`Migration::run`] executes the whole create → populate → switch →
//! stop-dual-writes (→ cleanup) sequence while holding a [`MigrationLock`]
//! keyed by the read alias. Live incremental writes are not blocked; external
//! versioning keeps them correct while the population runs.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swapindex_core::{BuildTag, Settings};

use crate::error::{SwapError, SwapResult};
use crate::lifecycle::{IndexManager, NoProgress, PopulateProgress, PopulateReport, ReadSwitch};

/// One step of a migration, as reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    CreateIndex,
    Populate,
    SwitchRead,
    StopDualWrites,
    Cleanup,
}

impl MigrationStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateIndex => "create_index",
            Self::Populate => "populate",
            Self::SwitchRead => "switch_read",
            Self::StopDualWrites => "stop_dual_writes",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutual exclusion for lifecycle administration.
///
/// Single-process deployments can use [`InProcessLock`]; anything spanning
/// processes needs an implementation backed by shared storage.
pub trait MigrationLock: Send + Sync {
    /// Take the lock for `key` without waiting.
    ///
    /// Returns [`SwapError::MigrationLocked`] if it is already held.
    fn try_acquire(&self, key: &str) -> SwapResult<MigrationGuard<'_>>;
}

type Release<'a> = Box<dyn FnOnce(&str) + Send + 'a>;

/// Holds a migration lock; releases it on drop.
pub struct MigrationGuard<'a> {
    key: String,
    release: Option<Release<'a>>,
}

impl<'a> MigrationGuard<'a> {
    /// A guard that calls `release(key)` when dropped.
    pub fn new(key: impl Into<String>, release: impl FnOnce(&str) + Send + 'a) -> Self {
        Self {
            key: key.into(),
            release: Some(Box::new(release)),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for MigrationGuard<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.key);
        }
    }
}

impl fmt::Debug for MigrationGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Lock table local to this process
#[derive(Debug, Default)]
pub struct InProcessLock {
    held: Mutex<HashSet<String>>,
}

impl InProcessLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl MigrationLock for InProcessLock {
    fn try_acquire(&self, key: &str) -> SwapResult<MigrationGuard<'_>> {
        let inserted = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned());
        if !inserted {
            return Err(SwapError::MigrationLocked {
                key: key.to_owned(),
            });
        }
        Ok(MigrationGuard::new(key, move |key| {
            self.held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key);
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    pub batch_size: usize,
    /// Delete retired indices once dual writes have stopped
    pub cleanup: bool,
}

impl MigrationOptions {
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.populate_batch_size,
            cleanup: settings.cleanup_after_migration,
        }
    }
}

/// What a completed migration did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub cluster: String,
    pub read_alias: String,
    pub build_tag: String,
    pub index: String,
    pub started_at: DateTime<Utc>,
    pub population: PopulateReport,
    pub switch: ReadSwitch,
    /// Indices removed from the write alias
    pub retired: Vec<String>,
    /// Indices deleted; empty unless cleanup ran
    pub deleted: Vec<String>,
    pub elapsed_ms: u64,
}

/// A full blue-green rebuild of one index family on one cluster.
pub struct Migration<'m, R> {
    manager: &'m IndexManager<R>,
    options: MigrationOptions,
    progress: &'m dyn PopulateProgress,
}

impl<'m, R> Migration<'m, R> {
    #[must_use]
    pub fn new(manager: &'m IndexManager<R>) -> Self {
        Self {
            manager,
            options: MigrationOptions::from_settings(manager.config().settings()),
            progress: &NoProgress,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'m dyn PopulateProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Run every step while holding `lock` for the read alias.
    ///
    /// Stops at the first failing step and reports it as
    /// [`SwapError::MigrationFailed`]. Steps already completed stay applied;
    /// each can be re-run on its own through the [`IndexManager`].
    pub fn run(&self, lock: &dyn MigrationLock, build_tag: &BuildTag) -> SwapResult<MigrationReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let manager = self.manager;
        let read_alias = manager.config().read_alias();
        let tag = build_tag.as_str();

        let guard = lock.try_acquire(read_alias)?;
        tracing::info!(
            target: "swapindex.migration",
            cluster = manager.target().name(),
            lock = guard.key(),
            build_tag = tag,
            "migration started"
        );

        let index = step(MigrationStep::CreateIndex, || manager.create_index(tag))?;
        let population = step(MigrationStep::Populate, || {
            manager.populate_index_with_progress(Some(tag), self.options.batch_size, self.progress)
        })?;
        let switch = step(MigrationStep::SwitchRead, || manager.switch_read_index(tag))?;
        let retired = step(MigrationStep::StopDualWrites, || manager.stop_dual_writes())?;
        let deleted = if self.options.cleanup {
            step(MigrationStep::Cleanup, || manager.cleanup_old_indices())?
        } else {
            Vec::new()
        };
        drop(guard);

        let report = MigrationReport {
            cluster: manager.target().name().to_owned(),
            read_alias: read_alias.to_owned(),
            build_tag: tag.to_owned(),
            index,
            started_at,
            population,
            switch,
            retired,
            deleted,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            target: "swapindex.migration",
            cluster = %report.cluster,
            index = %report.index,
            records = report.population.records,
            retired = report.retired.len(),
            deleted = report.deleted.len(),
            elapsed_ms = report.elapsed_ms,
            "migration finished"
        );
        Ok(report)
    }
}

fn step<T>(step: MigrationStep, run: impl FnOnce() -> SwapResult<T>) -> SwapResult<T> {
    run().map_err(|source| {
        tracing::error!(
            target: "swapindex.migration",
            %step,
            error = %source,
            error_type = source.error_type(),
            "migration step failed"
        );
        SwapError::MigrationFailed {
            step,
            source: Box::new(source),
        }
    })
}
