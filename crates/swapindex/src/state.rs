//! Live alias state of one index family on one cluster

use serde::{Deserialize, Serialize};

/// Where an index family stands, derived from its alias bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPhase {
    /// The read alias resolves to nothing
    Unbound,
    /// Both aliases resolve to the same single index
    Steady,
    /// The read alias resolves to one index; the write alias spans it and
    /// at least one other
    DualWrite,
    /// Any other combination, e.g. the read index is not write-bound or
    /// the read alias spans several indices
    Drifted,
}

impl std::fmt::Display for AliasPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unbound => "unbound",
            Self::Steady => "steady",
            Self::DualWrite => "dual_write",
            Self::Drifted => "drifted",
        })
    }
}

/// Alias bindings and physical indices of one family, as queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasState {
    pub cluster: String,
    pub read_alias: String,
    pub write_alias: String,
    /// Indices bound to the read alias
    pub read_indices: Vec<String>,
    /// Indices bound to the write alias
    pub write_indices: Vec<String>,
    /// Every physical index of the family, sorted by name
    pub physical_indices: Vec<String>,
}

impl AliasState {
    #[must_use]
    pub fn phase(&self) -> AliasPhase {
        let Some(read) = self.read_index() else {
            return if self.read_indices.is_empty() {
                AliasPhase::Unbound
            } else {
                AliasPhase::Drifted
            };
        };
        if !self.write_indices.iter().any(|w| w == read) {
            return AliasPhase::Drifted;
        }
        if self.write_indices.len() == 1 {
            AliasPhase::Steady
        } else {
            AliasPhase::DualWrite
        }
    }

    /// The single index behind the read alias
    #[must_use]
    pub fn read_index(&self) -> Option<&str> {
        match self.read_indices.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Physical indices bound to neither alias; what cleanup would delete
    /// once dual writes have stopped.
    #[must_use]
    pub fn orphans(&self) -> Vec<&str> {
        self.physical_indices
            .iter()
            .filter(|name| !self.read_indices.contains(name) && !self.write_indices.contains(name))
            .map(String::as_str)
            .collect()
    }
}
