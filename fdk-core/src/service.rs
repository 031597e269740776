//! Exposed operations
//!
//! [`FdkService`] is the single entry point for the tool-dispatch layer. It
//! validates parameters before any I/O and delegates to the coordinator,
//! the search engine and the listing functions. The dependency graph is
//! built once, explicitly:
//!
//! ```text
//! RemoteSource -> CatalogStore -> CacheCoordinator -> SearchEngine -> FdkService
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::config::{FdkConfig, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::coordinator::{CacheCoordinator, DownloadStats, Origin};
use crate::error::{CatalogError, Result};
use crate::listing::{self, DomainListing, ListQuery, Listing};
use crate::model::{CatalogObject, Language, ReleaseInfo};
use crate::search::{SearchEngine, SearchQuery, SearchResults};
use crate::store::CatalogStore;

/// `getObject` response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResponse {
    #[serde(flatten)]
    pub object: CatalogObject,
    pub from_cache: bool,
}

/// Detail coverage of one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainCoverage {
    pub domain: String,
    pub total: usize,
    pub with_detail: usize,
    pub coverage_percent: f64,
}

/// `getCacheCoverage` response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCoverage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub total_known: usize,
    pub with_detail: usize,
    /// Stored, but only as a summary
    pub summary_only: usize,
    /// Known from a listing but with no stored record
    pub not_cached: usize,
    /// `summary_only + not_cached`
    pub missing: usize,
    pub coverage_percent: f64,
    /// Seconds to fetch `missing` at the default concurrency
    pub estimated_fetch_time: f64,
    pub missing_ids: Vec<String>,
    pub domains: Vec<DomainCoverage>,
}

/// `getCacheStats` response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub cache_enabled: bool,
    pub source: String,
    pub release: Option<ReleaseInfo>,
    pub last_updated: Option<DateTime<Utc>>,
    pub object_count: usize,
    pub with_detail: usize,
    pub is_fresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// The catalog operations, over an explicit dependency graph
pub struct FdkService {
    config: FdkConfig,
    coordinator: Arc<CacheCoordinator>,
    search: SearchEngine,
}

impl FdkService {
    pub fn new(coordinator: Arc<CacheCoordinator>, config: FdkConfig) -> Self {
        let search = SearchEngine::new(Arc::clone(&coordinator), &config);
        Self {
            config,
            coordinator,
            search,
        }
    }

    /// Wire the SBB source and, unless disabled, the file-system store
    #[cfg(feature = "sbb")]
    pub fn from_config(config: FdkConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let source = crate::source::SbbSource::new(&config.source)?;

        let store = if config.cache.enabled {
            let dir = config.cache.resolved_dir()?;
            let store = CatalogStore::open_dir(&dir)
                .with_context(|| format!("Failed to open catalog store at {}", dir.display()))?;
            Some(Arc::new(store))
        } else {
            tracing::info!("Persistent cache disabled");
            None
        };

        let coordinator = CacheCoordinator::from_config(Arc::new(source), store, &config);
        Ok(Self::new(Arc::new(coordinator), config))
    }

    pub fn config(&self) -> &FdkConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    fn store(&self) -> Option<&Arc<CatalogStore>> {
        self.coordinator.store()
    }

    fn concurrency(&self, requested: Option<usize>) -> Result<usize> {
        let n = requested.unwrap_or(self.config.download.max_concurrency);
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&n) {
            return Err(CatalogError::validation(format!(
                "max concurrency must be between {} and {}, got {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY, n
            )));
        }
        Ok(n)
    }

    /// Bulk operations write to the store, which holds one language
    fn check_language(&self, requested: Option<Language>) -> Result<()> {
        let store_language = self.coordinator.language();
        match requested {
            Some(language) if language != store_language && self.store().is_some() => {
                Err(CatalogError::validation(format!(
                    "the cache holds '{}' records; configure language '{}' to cache it",
                    store_language, language
                )))
            }
            _ => Ok(()),
        }
    }

    /// `listObjects`
    ///
    /// Grouping by property set first fetches detail for the selected
    /// summary records, so an unloaded record is never mistaken for one
    /// without property sets.
    pub async fn list_objects(&self, query: &ListQuery) -> Result<Listing> {
        query.validate(self.config.search.max_limit)?;
        let mut objects = self.coordinator.snapshot().await?;

        let mut backfill = None;
        if query.needs_detail() {
            let ids: Vec<String> = objects
                .iter()
                .filter(|o| !o.is_detail() && query.selects(o))
                .map(|o| o.id.clone())
                .collect();
            if !ids.is_empty() {
                debug!("Loading detail for {} objects before grouping", ids.len());
                let (stats, fetched) = self
                    .coordinator
                    .fetch_many(ids, self.config.download.max_concurrency, true)
                    .await;
                let mut by_id: HashMap<String, CatalogObject> =
                    fetched.into_iter().map(|o| (o.id.clone(), o)).collect();
                for object in objects.iter_mut() {
                    if let Some(detail) = by_id.remove(&object.id) {
                        *object = detail;
                    }
                }
                backfill = Some(stats);
            }
        }

        let mut listing = listing::list(&objects, query);
        if let Some(stats) = backfill {
            listing.backfilled = stats.succeeded;
            listing.backfill_failed = stats.failed_ids;
        }
        Ok(listing)
    }

    /// `getObject`: detail record, from the store when it holds one
    pub async fn get_object(&self, id: &str, language: Option<Language>) -> Result<ObjectResponse> {
        let language = language.unwrap_or(self.coordinator.language());
        let (object, origin) = self.coordinator.resolve(id, language).await?;
        Ok(ObjectResponse {
            object,
            from_cache: origin == Origin::Cache,
        })
    }

    /// `searchProperties`
    pub async fn search_properties(&self, query: &str, limit: usize) -> Result<SearchResults> {
        self.search.search_properties(query, limit).await
    }

    /// `advancedSearch`
    pub async fn advanced_search(&self, query: &SearchQuery) -> Result<SearchResults> {
        self.search.search(query).await
    }

    /// `listDomains`
    pub async fn list_domains(&self) -> Result<DomainListing> {
        let objects = self.coordinator.snapshot().await?;
        Ok(listing::list_domains(&objects))
    }

    /// `downloadAll`: fetch detail for every object, including held ones
    pub async fn download_all(
        &self,
        language: Option<Language>,
        domain: Option<&str>,
        max_concurrency: Option<usize>,
    ) -> Result<DownloadStats> {
        let concurrency = self.concurrency(max_concurrency)?;
        self.check_language(language)?;
        self.coordinator.download_all(domain, concurrency).await
    }

    /// `updateCache`: fetch detail only where it is missing
    pub async fn update_cache(
        &self,
        language: Option<Language>,
        domain: Option<&str>,
        force_refresh: bool,
        max_concurrency: Option<usize>,
    ) -> Result<DownloadStats> {
        let concurrency = self.concurrency(max_concurrency)?;
        self.check_language(language)?;
        self.coordinator
            .update_missing(domain, force_refresh, concurrency)
            .await
    }

    /// `getCacheCoverage`: reads the store only; without one, everything is missing
    pub async fn get_cache_coverage(&self, domain: Option<&str>) -> Result<CacheCoverage> {
        let in_domain =
            |obj: &CatalogObject| domain.map_or(true, |d| obj.domain.eq_ignore_ascii_case(d));

        let (objects, not_cached_ids) = match self.store() {
            Some(store) => {
                let objects: Vec<CatalogObject> =
                    store.list_all().into_iter().filter(|o| in_domain(o)).collect();
                // Unstored ids have no domain to filter on
                let not_cached: Vec<String> = if domain.is_none() {
                    store
                        .get_metadata()
                        .known_object_ids
                        .into_iter()
                        .filter(|id| store.get(id).is_none())
                        .collect()
                } else {
                    Vec::new()
                };
                (objects, not_cached)
            }
            None => {
                let objects: Vec<CatalogObject> = self
                    .coordinator
                    .snapshot()
                    .await?
                    .into_iter()
                    .filter(|o| in_domain(o))
                    .collect();
                let ids = objects.iter().map(|o| o.id.clone()).collect();
                (Vec::new(), ids)
            }
        };

        let with_detail = objects.iter().filter(|o| o.is_detail()).count();
        let summary_only = objects.len() - with_detail;
        let not_cached = not_cached_ids.len();
        let total_known = objects.len() + not_cached;
        let missing = summary_only + not_cached;

        let mut missing_ids: Vec<String> = objects
            .iter()
            .filter(|o| !o.is_detail())
            .map(|o| o.id.clone())
            .chain(not_cached_ids)
            .collect();
        missing_ids.sort();

        let concurrency = self.config.download.max_concurrency.max(1) as f64;
        let estimated_fetch_time =
            missing as f64 * self.config.download.estimated_seconds_per_object / concurrency;

        Ok(CacheCoverage {
            domain: domain.map(str::to_string),
            total_known,
            with_detail,
            summary_only,
            not_cached,
            missing,
            coverage_percent: percent(with_detail, total_known),
            estimated_fetch_time,
            missing_ids,
            domains: domain_breakdown(&objects),
        })
    }

    /// `getCacheStats`
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        let source = self.coordinator.source_name().to_string();
        let Some(store) = self.store() else {
            return Ok(CacheStats {
                cache_enabled: false,
                source,
                ..Default::default()
            });
        };

        let metadata = store.get_metadata();
        Ok(CacheStats {
            cache_enabled: true,
            source,
            is_fresh: store.is_fresh(self.coordinator.max_age()),
            release: metadata.release,
            last_updated: metadata.last_updated,
            object_count: store.len(),
            with_detail: store.detail_count(),
            location: Some(store.location()),
        })
    }

    /// `clearCache`: drop every record and the metadata
    pub async fn clear_cache(&self) -> Result<usize> {
        match self.store() {
            Some(store) => Ok(store.clear()?),
            None => Ok(0),
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / whole as f64).round() / 10.0
    }
}

fn domain_breakdown(objects: &[CatalogObject]) -> Vec<DomainCoverage> {
    let mut per_domain: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for object in objects {
        let entry = per_domain.entry(object.domain.as_str()).or_default();
        entry.0 += 1;
        if object.is_detail() {
            entry.1 += 1;
        }
    }
    per_domain
        .into_iter()
        .map(|(domain, (total, with_detail))| DomainCoverage {
            domain: domain.to_string(),
            total,
            with_detail,
            coverage_percent: percent(with_detail, total),
        })
        .collect()
}
