//! Shared helpers for fdk-core integration tests
//!
//! `MockSource` is a scripted in-memory catalog: it counts calls, can fail
//! chosen ids, and can delay detail fetches so concurrent callers overlap.
//! It also records the peak number of detail fetches running at once.

#![allow(dead_code)]

use async_trait::async_trait;
use fdk_core::config::RetryPolicy;
use fdk_core::coordinator::CacheCoordinator;
use fdk_core::model::{CatalogObject, Language, Property, PropertySet, ReleaseInfo};
use fdk_core::source::{RemoteSource, SummaryListing};
use fdk_core::{CatalogStore, SourceError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Detail record with one `SBB-CFF-FFS_PO_*` property set
pub fn detail_of(summary: &CatalogObject) -> CatalogObject {
    let mut detail = summary.clone().into_detail();
    detail.description = Some(format!("Beschreibung von {}", summary.name));
    detail.property_sets = vec![PropertySet::new(
        format!("PS_{}", summary.id),
        "SBB-CFF-FFS_PO_Allgemein",
        vec![
            Property::new("P_MAT", "Material"),
            Property::new("P_LEN", "Länge"),
        ],
    )];
    detail
}

pub fn summary(id: &str, name: &str, domain: &str) -> CatalogObject {
    CatalogObject::summary(id, name, domain)
}

/// `count` summaries `OBJ_<prefix>_<n>` in `domain`, zero-padded for id order
pub fn numbered(prefix: &str, domain: &str, count: usize) -> Vec<CatalogObject> {
    (1..=count)
        .map(|n| summary(&format!("OBJ_{prefix}_{n:04}"), &format!("Objekt {n}"), domain))
        .collect()
}

#[derive(Default)]
pub struct MockSource {
    summaries: Mutex<Vec<CatalogObject>>,
    details: Mutex<BTreeMap<String, CatalogObject>>,
    release: Mutex<Option<ReleaseInfo>>,
    /// Ids that always fail with `Unavailable`
    failing: Mutex<HashSet<String>>,
    /// Ids that fail with `Unavailable` this many more times
    flaky: Mutex<HashMap<String, usize>>,
    listing_fails: Mutex<bool>,
    detail_delay: Mutex<Duration>,
    listing_calls: AtomicUsize,
    detail_calls: Mutex<HashMap<String, usize>>,
    detail_running: AtomicUsize,
    detail_peak: AtomicUsize,
}

/// Counts one running detail fetch until dropped
struct RunningFetch<'a>(&'a AtomicUsize);

impl<'a> RunningFetch<'a> {
    fn start(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(running)
    }
}

impl Drop for RunningFetch<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSource {
    /// Catalog whose details are derived from `summaries` via [`detail_of`]
    pub fn with_objects(summaries: Vec<CatalogObject>) -> Arc<Self> {
        let source = Self::default();
        {
            let mut details = source.details.lock().unwrap();
            for s in &summaries {
                details.insert(s.id.clone(), detail_of(s));
            }
        }
        *source.summaries.lock().unwrap() = summaries;
        *source.release.lock().unwrap() = Some(ReleaseInfo::new("2024.1", "2024-01-15"));
        Arc::new(source)
    }

    pub fn set_release(&self, version: &str) {
        *self.release.lock().unwrap() = Some(ReleaseInfo::new(version, "2024-06-01"));
    }

    pub fn fail_id(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_times(&self, id: &str, times: usize) {
        self.flaky.lock().unwrap().insert(id.to_string(), times);
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.listing_fails.lock().unwrap() = fail;
    }

    pub fn set_detail_delay(&self, delay: Duration) {
        *self.detail_delay.lock().unwrap() = delay;
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self, id: &str) -> usize {
        self.detail_calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_detail_calls(&self) -> usize {
        self.detail_calls.lock().unwrap().values().sum()
    }

    /// Most detail fetches observed in flight at the same time
    pub fn peak_concurrent_details(&self) -> usize {
        self.detail_peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn fetch_all_summaries(&self, _language: Language) -> Result<SummaryListing, SourceError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if *self.listing_fails.lock().unwrap() {
            return Err(SourceError::Unavailable {
                message: "HTTP 503".into(),
            });
        }
        let objects = self.summaries.lock().unwrap().clone();
        Ok(SummaryListing {
            total_count: objects.len(),
            objects,
            release: self.release.lock().unwrap().clone(),
        })
    }

    async fn fetch_detail(&self, id: &str, _language: Language) -> Result<CatalogObject, SourceError> {
        *self
            .detail_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(0) += 1;
        let _running = RunningFetch::start(&self.detail_running, &self.detail_peak);

        let delay = *self.detail_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(id) {
            return Err(SourceError::Unavailable {
                message: format!("forced failure for {id}"),
            });
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(SourceError::Timeout {
                        message: "30s".into(),
                    });
                }
            }
        }

        self.details
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound { id: id.to_string() })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Coordinator over `source` and an in-memory store, retrying without delay
pub fn coordinator_with_store(source: Arc<MockSource>) -> (Arc<CacheCoordinator>, Arc<CatalogStore>) {
    let store = Arc::new(CatalogStore::in_memory());
    let coordinator = CacheCoordinator::new(source, Some(Arc::clone(&store)), Language::De)
        .with_retry(RetryPolicy::immediate(3));
    (Arc::new(coordinator), store)
}
