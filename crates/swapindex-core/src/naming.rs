//! Naming policy for aliases and physical indices
//!
//! Every index family has a stable logical identity:
//! - the **read alias** queries are issued against (default: the source
//!   collection name)
//! - the **write alias** writes are issued against (default: read alias + `_write`)
//! - one **physical index** per build, named `{read_alias}_{build_tag}`
//!
//! Names follow the search engine's index naming rules and are validated once,
//! when the configuration is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Suffix appended to the read alias to derive the default write alias
pub const WRITE_ALIAS_SUFFIX: &str = "write";

const MAX_NAME_BYTES: usize = 255;
const FORBIDDEN_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ':'];

/// Validate a name against the engine's index/alias naming rules.
pub fn validate_index_name(role: &'static str, name: &str) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidName {
        role,
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(invalid("must be at most 255 bytes"));
    }
    if name == "." || name == ".." {
        return Err(invalid("must not be `.` or `..`"));
    }
    if name.starts_with(['-', '_', '+']) {
        return Err(invalid("must not start with `-`, `_` or `+`"));
    }
    if name.chars().any(char::is_uppercase) {
        return Err(invalid("must be lowercase"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(&format!("contains forbidden character {c:?}")));
    }
    Ok(())
}

/// Caller-supplied token distinguishing one physical build from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTag(String);

impl BuildTag {
    /// Wrap an explicit tag, rejecting characters that cannot appear in an index name.
    pub fn new(tag: impl Into<String>) -> ConfigResult<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(ConfigError::InvalidName {
                role: "build tag",
                name: tag,
                reason: "must not be empty".to_owned(),
            });
        }
        // A tag is always a suffix, so a leading `_` or `-` is fine; prefix it
        // with a dummy head to reuse the full-name rules.
        validate_index_name("build tag", &format!("x{tag}")).map_err(|err| match err {
            ConfigError::InvalidName { role, reason, .. } => ConfigError::InvalidName {
                role,
                name: tag.clone(),
                reason,
            },
            other => other,
        })?;
        Ok(Self(tag))
    }

    /// A tag derived from the current UTC time (`YYYYMMDDHHMMSS`).
    #[must_use]
    pub fn timestamped() -> Self {
        Self::timestamped_at(Utc::now())
    }

    #[must_use]
    pub fn timestamped_at(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S").to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BuildTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The read/write alias pair for one index family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexNames {
    read_alias: String,
    write_alias: String,
}

impl IndexNames {
    /// Derive the alias pair from the data source's collection name and
    /// optional overrides.
    pub fn new(
        source_name: &str,
        read_override: Option<&str>,
        write_override: Option<&str>,
    ) -> ConfigResult<Self> {
        let read_alias = read_override.unwrap_or(source_name).to_owned();
        validate_index_name("read alias", &read_alias)?;

        let write_alias = write_override.map_or_else(
            || format!("{read_alias}_{WRITE_ALIAS_SUFFIX}"),
            str::to_owned,
        );
        validate_index_name("write alias", &write_alias)?;

        if read_alias == write_alias {
            return Err(ConfigError::AliasCollision(read_alias));
        }

        Ok(Self {
            read_alias,
            write_alias,
        })
    }

    #[must_use]
    pub fn read_alias(&self) -> &str {
        &self.read_alias
    }

    #[must_use]
    pub fn write_alias(&self) -> &str {
        &self.write_alias
    }

    /// Physical index name for a build: `{read_alias}_{build_tag}`.
    pub fn physical_name(&self, build_tag: &str) -> ConfigResult<String> {
        let tag = BuildTag::new(build_tag)?;
        let name = format!("{}_{tag}", self.read_alias);
        validate_index_name("physical index", &name)?;
        if name == self.write_alias {
            return Err(ConfigError::InvalidName {
                role: "build tag",
                name: tag.to_string(),
                reason: "physical name would collide with the write alias".to_owned(),
            });
        }
        Ok(name)
    }

    /// Whether `index` is a physical index of this family.
    ///
    /// This is a prefix match on `<read>_`, so it also accepts indices of a
    /// family whose read alias extends this one (`products_archive_v1` for
    /// `products`). See [`nested_read_aliases`](Self::nested_read_aliases).
    #[must_use]
    pub fn owns_physical_name(&self, index: &str) -> bool {
        index
            .strip_prefix(self.read_alias.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|tag| !tag.is_empty())
    }

    /// Read aliases of longer families that could also own `index`.
    ///
    /// For `products_archive_2024_v1` under `products` these are
    /// `products_archive` and `products_archive_2024`. The write alias is
    /// never listed.
    #[must_use]
    pub fn nested_read_aliases(&self, index: &str) -> Vec<String> {
        let Some(tag) = index
            .strip_prefix(self.read_alias.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            return Vec::new();
        };
        tag.match_indices('_')
            .map(|(at, _)| format!("{}_{}", self.read_alias, &tag[..at]))
            .filter(|alias| *alias != self.write_alias)
            .collect()
    }
}
