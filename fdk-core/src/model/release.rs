//! Upstream release information

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The upstream catalog release a store snapshot reflects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Release identifier (e.g. "2024.1", "v1.5", "3.2.0")
    pub version_id: String,

    /// Release date as published upstream (ISO format)
    pub timestamp: String,
}

impl ReleaseInfo {
    pub fn new(version_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Compare release ids.
    ///
    /// Uses semver ordering when both ids parse (a leading `v` is ignored),
    /// falling back to plain string comparison otherwise.
    pub fn compare_version(&self, other: &ReleaseInfo) -> Ordering {
        let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v'));
        match (parse(&self.version_id), parse(&other.version_id)) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => self.version_id.cmp(&other.version_id),
        }
    }

    pub fn is_newer_than(&self, other: &ReleaseInfo) -> bool {
        self.compare_version(other) == Ordering::Greater
    }
}

impl fmt::Display for ReleaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version_id, self.timestamp)
    }
}
