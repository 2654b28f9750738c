//! Configuration errors
//!
//! Raised at construction time and never retried.

use thiserror::Error;

/// Result type alias for configuration
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid {role} name {name:?}: {reason}")]
    InvalidName {
        role: &'static str,
        name: String,
        reason: String,
    },

    #[error("Read alias and write alias must differ (both are {0:?})")]
    AliasCollision(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

impl ConfigError {
    /// Returns the error type string (for structured logs and reports)
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "INVALID_NAME",
            Self::AliasCollision(_) => "ALIAS_COLLISION",
            Self::MissingField(_) => "MISSING_FIELD",
        }
    }
}
