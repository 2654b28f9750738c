//! Classification of bulk item errors
//!
//! An item error is *ignorable* only when the engine rejected an externally
//! versioned write because the stored version is higher than or equal to the
//! one provided. That is the expected outcome when a population run races
//! live incremental writes, or when stale data is replayed. Everything else
//! is fatal and reported back to the caller.

use regex::Regex;

use crate::error::BulkItemError;
use crate::wire::{BulkResponse, ItemError};

/// Engine error type for rejected versioned writes
pub const VERSION_CONFLICT_TYPE: &str = "version_conflict_engine_exception";

/// Matches both the typed (`[type][id]: ...`) and typeless (`[id]: ...`)
/// phrasing of the engine's conflict reason.
fn version_conflict_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\[[^\]]*\])?\[[^\]]*\]: version conflict, current version \[\d+\] is higher or equal to the one provided \[\d+\]$",
        )
        .expect("valid regex")
    })
}

/// Whether `error` reports a benign stale-version rejection.
#[must_use]
pub fn is_ignorable_conflict(error: &ItemError) -> bool {
    error.error_type == VERSION_CONFLICT_TYPE && version_conflict_re().is_match(&error.reason)
}

/// A bulk response partitioned into applied, ignored and fatal items
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkOutcome {
    pub applied: usize,
    pub ignored_conflicts: usize,
    pub fatal: Vec<BulkItemError>,
}

impl BulkOutcome {
    #[must_use]
    pub fn from_response(response: &BulkResponse) -> Self {
        let mut outcome = Self::default();
        for item in &response.items {
            let Some((action, result)) = item.outcome() else {
                continue;
            };
            match &result.error {
                None => outcome.applied += 1,
                Some(error) if is_ignorable_conflict(error) => outcome.ignored_conflicts += 1,
                Some(error) => outcome.fatal.push(BulkItemError {
                    action,
                    index: result.index.clone(),
                    id: result.id.clone(),
                    status: result.status,
                    error_type: error.error_type.clone(),
                    reason: error.reason.clone(),
                    raw: serde_json::to_value(result).unwrap_or_default(),
                }),
            }
        }
        outcome
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.fatal.is_empty()
    }
}
