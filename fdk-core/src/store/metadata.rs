//! Store metadata record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::model::ReleaseInfo;

/// Process-wide metadata persisted next to the object records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    /// Upstream release the store reflects
    #[serde(default)]
    pub release: Option<ReleaseInfo>,

    /// When the summary listing was last refreshed
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Ids with at least summary data
    #[serde(default)]
    pub known_object_ids: BTreeSet<String>,

    /// Object count reported by the last listing
    #[serde(default)]
    pub upstream_count: usize,
}

impl StoreMetadata {
    /// Whether `last_updated` lies within `max_age` of `now`
    pub fn is_fresh_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_updated else {
            return false;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return true;
        };
        let age = now.signed_duration_since(last);
        age >= chrono::Duration::zero() && age < max_age
    }

    pub fn age(&self) -> Option<chrono::Duration> {
        self.last_updated
            .map(|last| Utc::now().signed_duration_since(last))
    }
}
