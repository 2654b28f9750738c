//! Runtime settings for swapindex
//!
//! Settings are loaded from environment variables. Tests pass a lookup
//! closure instead of mutating the process environment.

use std::env;

/// Records per bulk request during a full population
pub const DEFAULT_POPULATE_BATCH_SIZE: usize = 3000;

pub const ENV_POPULATE_BATCH_SIZE: &str = "SWAPINDEX_POPULATE_BATCH_SIZE";
pub const ENV_PARALLEL_FANOUT: &str = "SWAPINDEX_PARALLEL_FANOUT";
pub const ENV_PROGRESS_EVERY: &str = "SWAPINDEX_PROGRESS_EVERY";
pub const ENV_CLEANUP_AFTER_MIGRATION: &str = "SWAPINDEX_CLEANUP_AFTER_MIGRATION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Records per batch when streaming the data source into a new index
    pub populate_batch_size: usize,
    /// Issue per-cluster bulk requests concurrently (scoped threads)
    pub parallel_fanout: bool,
    /// Log population progress every N batches
    pub progress_every: usize,
    /// Delete retired physical indices at the end of a migration
    pub cleanup_after_migration: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            populate_batch_size: DEFAULT_POPULATE_BATCH_SIZE,
            parallel_fanout: true,
            progress_every: 1,
            cleanup_after_migration: false,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    ///
    /// Unparseable or zero-sized values fall back to the defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            populate_batch_size: lookup_usize(&lookup, ENV_POPULATE_BATCH_SIZE)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.populate_batch_size),
            parallel_fanout: lookup(ENV_PARALLEL_FANOUT)
                .map_or(defaults.parallel_fanout, |v| {
                    parse_bool(&v, defaults.parallel_fanout)
                }),
            progress_every: lookup_usize(&lookup, ENV_PROGRESS_EVERY)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.progress_every),
            cleanup_after_migration: lookup(ENV_CLEANUP_AFTER_MIGRATION)
                .map_or(defaults.cleanup_after_migration, |v| {
                    parse_bool(&v, defaults.cleanup_after_migration)
                }),
        }
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

fn lookup_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    lookup(key).and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            trimmed.parse().ok()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.populate_batch_size, 3000);
        assert!(settings.parallel_fanout);
        assert!(!settings.cleanup_after_migration);
    }

    #[test]
    fn values_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            (ENV_POPULATE_BATCH_SIZE, " 500 "),
            (ENV_PARALLEL_FANOUT, "no"),
            (ENV_PROGRESS_EVERY, "10"),
            (ENV_CLEANUP_AFTER_MIGRATION, "yes"),
        ]));
        assert_eq!(settings.populate_batch_size, 500);
        assert!(!settings.parallel_fanout);
        assert_eq!(settings.progress_every, 10);
        assert!(settings.cleanup_after_migration);
    }

    #[test]
    fn invalid_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[
            (ENV_POPULATE_BATCH_SIZE, "0"),
            (ENV_PARALLEL_FANOUT, "maybe"),
            (ENV_PROGRESS_EVERY, "lots"),
        ]));
        assert_eq!(settings.populate_batch_size, DEFAULT_POPULATE_BATCH_SIZE);
        assert!(settings.parallel_fanout);
        assert_eq!(settings.progress_every, 1);
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("1", false));
        assert!(!parse_bool("f", true));
        assert!(parse_bool("", true));
    }
}
