//! Cache coordinator
//!
//! Decides whether a request can be served from the [`CatalogStore`] or must
//! go to the [`RemoteSource`], and drives bulk backfill.
//!
//! Per object id the store moves `Unknown -> Summary -> Detail`. Summaries
//! arrive with the bulk listing, detail with a single-object fetch. Detail is
//! only ever dropped by a forced refresh.
//!
//! Concurrency rules:
//! - at most one in-flight detail fetch per (id, language); later callers
//!   await the same shared result
//! - every detail fetch runs as a spawned task, so an abandoned caller does
//!   not stop fetches that already started
//! - bulk fetches hold a semaphore permit until their fetch resolves
//! - every successful fetch is persisted as soon as it completes

mod retry;
mod stats;

pub use stats::{DownloadStats, RefreshOutcome};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{FdkConfig, RetryPolicy, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::error::{CatalogError, Result, SourceError};
use crate::model::{CatalogObject, Completeness, Language};
use crate::source::{RemoteSource, SummaryListing};
use crate::store::CatalogStore;

use retry::with_retry;

type InflightFetch = Shared<BoxFuture<'static, Result<CatalogObject>>>;
type InflightMap = Mutex<HashMap<(String, Language), InflightFetch>>;

/// Where a returned object came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Remote,
}

/// Coordinates the local store with the remote source
pub struct CacheCoordinator {
    source: Arc<dyn RemoteSource>,
    store: Option<Arc<CatalogStore>>,
    /// Language the store's records are kept in
    language: Language,
    max_age: Duration,
    retry: RetryPolicy,
    inflight: Arc<InflightMap>,
    /// Serializes listing refreshes so concurrent callers share one fetch
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CacheCoordinator {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Option<Arc<CatalogStore>>,
        language: Language,
    ) -> Self {
        Self {
            source,
            store,
            language,
            max_age: FdkConfig::default().cache.max_age(),
            retry: RetryPolicy::default(),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build from configuration (language, freshness window, retry policy)
    pub fn from_config(
        source: Arc<dyn RemoteSource>,
        store: Option<Arc<CatalogStore>>,
        config: &FdkConfig,
    ) -> Self {
        Self::new(source, store, config.source.language)
            .with_retry(config.retry.clone())
            .with_max_age(config.cache.max_age())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn store(&self) -> Option<&Arc<CatalogStore>> {
        self.store.as_ref()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Refresh the summary listing if it is older than the configured window
    pub async fn refresh_if_stale(&self) -> Result<RefreshOutcome> {
        self.ensure_fresh(self.max_age).await
    }

    /// Refresh the summary listing unless the store is younger than `max_age`
    ///
    /// A no-op without a store. On failure the metadata is left untouched.
    pub async fn ensure_fresh(&self, max_age: Duration) -> Result<RefreshOutcome> {
        let Some(store) = &self.store else {
            debug!("No store configured, nothing to refresh");
            return Ok(RefreshOutcome::default());
        };

        let _refresh = self.refresh_lock.lock().await;
        let metadata = store.get_metadata();
        if store.is_fresh(max_age) {
            debug!("Store is fresh (max age {:?}), skipping refresh", max_age);
            return Ok(RefreshOutcome {
                release: metadata.release,
                ..Default::default()
            });
        }

        info!("Refreshing catalog listing from {}", self.source.name());
        let (result, attempts) = self.fetch_listing().await;
        let listing = result.map_err(|source| CatalogError::Refresh { attempts, source })?;

        let listed = listing.objects.len();
        let batch = store.put_batch(listing.objects)?;

        let mut metadata = store.get_metadata();
        let previous_release = metadata.release.clone();
        let release = listing.release.or_else(|| previous_release.clone());
        let release_changed = matches!(
            (&previous_release, &release),
            (Some(prev), Some(next)) if prev.version_id != next.version_id
        );
        if release_changed {
            if let (Some(prev), Some(next)) = (&previous_release, &release) {
                info!("Upstream release changed: {} -> {}", prev, next);
            }
        }

        metadata.release = release.clone();
        metadata.last_updated = Some(Utc::now());
        metadata.upstream_count = listing.total_count.max(listed);
        store.set_metadata(metadata)?;

        info!(
            "Listing refreshed: {} objects ({} new, {} detail records kept)",
            listed, batch.inserted, batch.kept_detail
        );

        Ok(RefreshOutcome {
            refreshed: true,
            release,
            previous_release,
            release_changed,
            listed,
            new_objects: batch.inserted,
        })
    }

    async fn fetch_listing(&self) -> (std::result::Result<SummaryListing, SourceError>, u32) {
        let source = self.source.as_ref();
        let language = self.language;
        with_retry(&self.retry, "Summary listing", move || {
            source.fetch_all_summaries(language)
        })
        .await
    }

    /// Every known object, summary and detail mixed, in id order
    ///
    /// With a store this refreshes a stale listing first; without one it
    /// fetches the summaries directly.
    pub async fn snapshot(&self) -> Result<Vec<CatalogObject>> {
        match &self.store {
            Some(store) => {
                self.refresh_if_stale().await?;
                Ok(store.list_all())
            }
            None => {
                let (result, attempts) = self.fetch_listing().await;
                let mut objects = result
                    .map_err(|source| CatalogError::Refresh { attempts, source })?
                    .objects;
                objects.sort_by(|a, b| a.id.cmp(&b.id));
                Ok(objects)
            }
        }
    }

    /// Detail record for `id` in the store's language
    pub async fn get_detail(&self, id: &str) -> Result<CatalogObject> {
        self.resolve(id, self.language).await.map(|(object, _)| object)
    }

    /// Detail record for `id`, reporting whether it came from the store
    ///
    /// Only requests in the store's language are served from or written to
    /// the store; other languages always go to the source.
    pub async fn resolve(&self, id: &str, language: Language) -> Result<(CatalogObject, Origin)> {
        if id.trim().is_empty() {
            return Err(CatalogError::validation("object id must not be empty"));
        }

        if language == self.language {
            if let Some(object) = self.store.as_ref().and_then(|s| s.get(id)) {
                if object.is_detail() {
                    debug!("Cache hit for {}", id);
                    return Ok((object, Origin::Cache));
                }
            }
        }

        debug!("Cache miss for {} ({})", id, language);
        let object = self.fetcher().fetch_shared(id, language).await?;
        Ok((object, Origin::Remote))
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher {
            source: Arc::clone(&self.source),
            store: self.store.clone(),
            store_language: self.language,
            retry: self.retry.clone(),
            inflight: Arc::clone(&self.inflight),
        }
    }

    /// Fetch detail for `ids` that lack it, bounded by `max_concurrency`
    ///
    /// With `domain_filter`, only ids whose stored domain matches
    /// (case-insensitive) are fetched. Failures are collected, never fatal.
    pub async fn bulk_fetch_details(
        &self,
        ids: &[String],
        max_concurrency: usize,
        domain_filter: Option<&str>,
    ) -> Result<DownloadStats> {
        let requested = ids.len();
        let targets: Vec<String> = match &self.store {
            Some(store) => ids
                .iter()
                .filter(|id| match store.get(id) {
                    Some(obj) if obj.completeness == Completeness::Detail => false,
                    Some(obj) => matches_domain(&obj, domain_filter),
                    None => domain_filter.is_none(),
                })
                .cloned()
                .collect(),
            None => ids.to_vec(),
        };

        let (mut stats, _) = self.fetch_many(targets, max_concurrency, false).await;
        stats.skipped = requested - stats.attempted;
        Ok(stats)
    }

    /// Refresh the listing, then fetch detail for every summary-only object
    ///
    /// `force_refresh` drops all detail first and rediscovers the listing.
    pub async fn update_missing(
        &self,
        domain_filter: Option<&str>,
        force_refresh: bool,
        max_concurrency: usize,
    ) -> Result<DownloadStats> {
        let Some(store) = &self.store else {
            info!("No store configured, nothing to update");
            return Ok(DownloadStats::default());
        };

        if force_refresh {
            let reset = store.reset_details()?;
            info!("Forced refresh: {} detail records reset", reset);
            self.ensure_fresh(Duration::ZERO).await?;
        } else {
            self.refresh_if_stale().await?;
        }

        let missing = store.ids(Some(Completeness::Summary));
        info!("{} objects without detail", missing.len());
        self.bulk_fetch_details(&missing, max_concurrency, domain_filter)
            .await
    }

    /// Fetch detail for every known object, including ones already held
    pub async fn download_all(
        &self,
        domain_filter: Option<&str>,
        max_concurrency: usize,
    ) -> Result<DownloadStats> {
        let objects = self.snapshot().await?;
        let total = objects.len();
        let targets: Vec<String> = objects
            .into_iter()
            .filter(|obj| matches_domain(obj, domain_filter))
            .map(|obj| obj.id)
            .collect();

        let (mut stats, _) = self.fetch_many(targets, max_concurrency, false).await;
        stats.skipped = total - stats.attempted;
        Ok(stats)
    }

    /// Fetch `ids` through the de-duplicated path with a bounded worker pool
    ///
    /// Returns the statistics and, when `collect` is set, the fetched objects
    /// in completion order.
    pub(crate) async fn fetch_many(
        &self,
        ids: Vec<String>,
        max_concurrency: usize,
        collect: bool,
    ) -> (DownloadStats, Vec<CatalogObject>) {
        let started = Instant::now();
        let concurrency = max_concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        let mut stats = DownloadStats {
            attempted: ids.len(),
            ..Default::default()
        };
        let mut fetched = Vec::new();

        if ids.is_empty() {
            return (stats, fetched);
        }
        info!(
            "Fetching detail for {} objects (concurrency {})",
            ids.len(),
            concurrency
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let fetcher = self.fetcher();
        let language = self.language;
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let permits = Arc::clone(&semaphore);
            let fetcher = fetcher.clone();
            let task_id = id.clone();
            // The permit is held until the shared fetch resolves
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                fetcher.fetch_shared(&task_id, language).await
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(object)) => {
                    stats.succeeded += 1;
                    if collect {
                        fetched.push(object);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Failed to fetch {}: {}", id, e);
                    stats.failed += 1;
                    stats.failed_ids.push(id);
                }
                Err(e) => {
                    warn!("Fetch task for {} did not complete: {}", id, e);
                    stats.failed += 1;
                    stats.failed_ids.push(id);
                }
            }
        }

        stats.failed_ids.sort();
        stats.elapsed = started.elapsed();
        info!(
            "Detail fetch finished: {} succeeded, {} failed in {:.1}s",
            stats.succeeded,
            stats.failed,
            stats.elapsed.as_secs_f64()
        );
        (stats, fetched)
    }
}

/// What a detached fetch task needs from the coordinator
#[derive(Clone)]
struct Fetcher {
    source: Arc<dyn RemoteSource>,
    store: Option<Arc<CatalogStore>>,
    store_language: Language,
    retry: RetryPolicy,
    inflight: Arc<InflightMap>,
}

impl Fetcher {
    /// Join or start the single in-flight fetch for (id, language)
    ///
    /// The fetch runs as its own task: it completes and persists even when
    /// every waiter has gone away.
    fn fetch_shared(&self, id: &str, language: Language) -> InflightFetch {
        let key = (id.to_string(), language);
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = inflight.get(&key) {
            debug!("Joining in-flight fetch for {}", id);
            return existing.clone();
        }

        let source = Arc::clone(&self.source);
        let store = if language == self.store_language {
            self.store.clone()
        } else {
            None
        };
        let retry = self.retry.clone();
        let registry = Arc::clone(&self.inflight);
        let owned_id = id.to_string();

        let task = tokio::spawn(async move {
            let result =
                fetch_and_persist(source.as_ref(), store.as_deref(), &retry, &owned_id, language)
                    .await;
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&(owned_id, language));
            result
        });

        let registry = Arc::clone(&self.inflight);
        let waiter_key = key.clone();
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    registry
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .remove(&waiter_key);
                    Err(CatalogError::Fetch {
                        id: waiter_key.0,
                        attempts: 0,
                        source: SourceError::Unavailable {
                            message: format!("fetch task did not complete: {e}"),
                        },
                    })
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(key, fetch.clone());
        fetch
    }
}

fn matches_domain(object: &CatalogObject, domain_filter: Option<&str>) -> bool {
    domain_filter.map_or(true, |d| object.domain.eq_ignore_ascii_case(d))
}

async fn fetch_and_persist(
    source: &dyn RemoteSource,
    store: Option<&CatalogStore>,
    retry: &RetryPolicy,
    id: &str,
    language: Language,
) -> Result<CatalogObject> {
    let what = format!("Detail fetch for {id}");
    let (result, attempts) = with_retry(retry, &what, move || source.fetch_detail(id, language)).await;
    let object = result
        .map_err(|e| CatalogError::from_fetch(id, attempts, e))?
        .into_detail();

    if let Some(store) = store {
        store.put(object.clone())?;
    }
    debug!("Fetched detail for {} after {} attempt(s)", id, attempts);
    Ok(object)
}
