//! Remote source port
//!
//! The capability the cache coordinator fetches through. A source performs
//! exactly one attempt per call; retry and backoff live in the coordinator.
//!
//! Implementations:
//! - [`SbbSource`]: the SBB FDK HTTP API (feature `sbb`)
//! - test doubles implementing [`RemoteSource`] directly

#[cfg(feature = "sbb")]
mod sbb;
mod wire;

#[cfg(feature = "sbb")]
pub use sbb::SbbSource;
pub use wire::{WireDetail, WireListing, WireSummary};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::model::{CatalogObject, Language, ReleaseInfo};

/// Result of a full summary listing
#[derive(Debug, Clone, Default)]
pub struct SummaryListing {
    /// Summary records, in upstream order
    pub objects: Vec<CatalogObject>,

    /// Object count reported upstream
    pub total_count: usize,

    pub release: Option<ReleaseInfo>,
}

/// Trait for remote catalog sources
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch summaries of every object in the catalog
    async fn fetch_all_summaries(&self, language: Language) -> Result<SummaryListing, SourceError>;

    /// Fetch the full record of one object
    ///
    /// Returns [`SourceError::NotFound`] when the id does not exist upstream.
    async fn fetch_detail(&self, id: &str, language: Language)
        -> Result<CatalogObject, SourceError>;

    fn supported_languages(&self) -> &[Language] {
        &Language::ALL
    }

    /// Source identifier for logging
    fn name(&self) -> &'static str;
}
