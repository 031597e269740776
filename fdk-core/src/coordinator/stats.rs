//! Outcome records for refresh and bulk download operations

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::model::ReleaseInfo;

/// Aggregate result of a bulk detail download
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    /// Fetches started
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Requested ids left out because they already hold detail
    /// or fall outside the domain filter
    pub skipped: usize,
    /// Sorted, so a retry can target exactly the remainder
    pub failed_ids: Vec<String>,
    #[serde(rename = "elapsedSeconds", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
}

impl DownloadStats {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Percentage of attempted fetches that succeeded (100 when nothing was attempted)
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            100.0
        } else {
            self.succeeded as f64 * 100.0 / self.attempted as f64
        }
    }
}

/// What `ensure_fresh` did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    /// False when the store was still fresh (no remote call made)
    pub refreshed: bool,
    pub release: Option<ReleaseInfo>,
    pub previous_release: Option<ReleaseInfo>,
    pub release_changed: bool,
    /// Summaries received from the source
    pub listed: usize,
    /// Ids that were not in the store before
    pub new_objects: usize,
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
