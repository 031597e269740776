//! Cache coordinator behavior against a scripted source

mod common;

use common::{coordinator_with_store, detail_of, init_test_logging, numbered, summary, MockSource};
use fdk_core::config::RetryPolicy;
use fdk_core::coordinator::{CacheCoordinator, Origin};
use fdk_core::model::{Completeness, Language};
use fdk_core::{CatalogError, CatalogStore};
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 3600);

#[tokio::test]
async fn test_ensure_fresh_is_idempotent_within_window() {
    init_test_logging();
    let source = MockSource::with_objects(numbered("FB", "Fahrbahn", 3));
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let first = coordinator.ensure_fresh(DAY).await.unwrap();
    assert!(first.refreshed);
    assert_eq!(first.listed, 3);
    assert_eq!(first.new_objects, 3);
    assert_eq!(source.listing_calls(), 1);
    assert_eq!(store.len(), 3);

    let second = coordinator.ensure_fresh(DAY).await.unwrap();
    assert!(!second.refreshed);
    assert_eq!(source.listing_calls(), 1);
    assert_eq!(source.total_detail_calls(), 0);
}

#[tokio::test]
async fn test_ensure_fresh_zero_age_always_refetches() {
    let source = MockSource::with_objects(numbered("FB", "Fahrbahn", 2));
    let (coordinator, _store) = coordinator_with_store(Arc::clone(&source));

    coordinator.ensure_fresh(DAY).await.unwrap();
    coordinator.ensure_fresh(Duration::ZERO).await.unwrap();
    assert_eq!(source.listing_calls(), 2);
}

#[tokio::test]
async fn test_refresh_keeps_detail_records() {
    let objects = numbered("FB", "Fahrbahn", 2);
    let source = MockSource::with_objects(objects.clone());
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    store.put(detail_of(&objects[0])).unwrap();
    let outcome = coordinator.ensure_fresh(DAY).await.unwrap();

    assert_eq!(outcome.new_objects, 1);
    assert!(store.has_detail(&objects[0].id));
    assert!(!store.has_detail(&objects[1].id));
}

#[tokio::test]
async fn test_refresh_failure_leaves_metadata_untouched() {
    let source = MockSource::with_objects(numbered("FB", "Fahrbahn", 2));
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    coordinator.ensure_fresh(DAY).await.unwrap();
    let before = store.get_metadata();

    source.fail_listing(true);
    let err = coordinator.ensure_fresh(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, CatalogError::Refresh { attempts: 3, .. }));
    assert!(err.is_transient());
    assert_eq!(store.get_metadata(), before);
    // 1 successful + 3 failed attempts
    assert_eq!(source.listing_calls(), 4);
}

#[tokio::test]
async fn test_release_change_is_reported() {
    let source = MockSource::with_objects(numbered("FB", "Fahrbahn", 1));
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let first = coordinator.ensure_fresh(DAY).await.unwrap();
    assert!(!first.release_changed);

    source.set_release("2024.2");
    let second = coordinator.ensure_fresh(Duration::ZERO).await.unwrap();
    assert!(second.release_changed);
    assert_eq!(second.previous_release.unwrap().version_id, "2024.1");
    assert_eq!(store.get_metadata().release.unwrap().version_id, "2024.2");
}

#[tokio::test]
async fn test_get_detail_fetches_once_then_serves_cache() {
    let objects = vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")];
    let source = MockSource::with_objects(objects);
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let (object, origin) = coordinator.resolve("OBJ_FB_1", Language::De).await.unwrap();
    assert_eq!(origin, Origin::Remote);
    assert_eq!(object.completeness, Completeness::Detail);
    assert!(store.has_detail("OBJ_FB_1"));

    let (_, origin) = coordinator.resolve("OBJ_FB_1", Language::De).await.unwrap();
    assert_eq!(origin, Origin::Cache);
    assert_eq!(source.detail_calls("OBJ_FB_1"), 1);
}

#[tokio::test]
async fn test_other_language_bypasses_store() {
    let source = MockSource::with_objects(vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")]);
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let (_, origin) = coordinator.resolve("OBJ_FB_1", Language::Fr).await.unwrap();
    assert_eq!(origin, Origin::Remote);
    assert!(store.get("OBJ_FB_1").is_none());
}

#[tokio::test]
async fn test_concurrent_get_detail_is_deduplicated() {
    init_test_logging();
    let source = MockSource::with_objects(vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")]);
    source.set_detail_delay(Duration::from_millis(50));
    let (coordinator, _store) = coordinator_with_store(Arc::clone(&source));

    let results = futures::future::join_all(
        (0..8).map(|_| coordinator.get_detail("OBJ_FB_1")),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(source.detail_calls("OBJ_FB_1"), 1);
}

#[tokio::test]
async fn test_get_detail_not_found_is_not_retried() {
    let source = MockSource::with_objects(vec![]);
    let (coordinator, _store) = coordinator_with_store(Arc::clone(&source));

    let err = coordinator.get_detail("OBJ_NOPE").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { ref id } if id == "OBJ_NOPE"));
    assert_eq!(source.detail_calls("OBJ_NOPE"), 1);
}

#[tokio::test]
async fn test_get_detail_retries_transient_failures() {
    let source = MockSource::with_objects(vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")]);
    source.fail_times("OBJ_FB_1", 2);
    let (coordinator, _store) = coordinator_with_store(Arc::clone(&source));

    coordinator.get_detail("OBJ_FB_1").await.unwrap();
    assert_eq!(source.detail_calls("OBJ_FB_1"), 3);
}

#[tokio::test]
async fn test_get_detail_gives_up_after_retries() {
    let source = MockSource::with_objects(vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")]);
    source.fail_id("OBJ_FB_1");
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let err = coordinator.get_detail("OBJ_FB_1").await.unwrap_err();
    assert!(matches!(err, CatalogError::Fetch { attempts: 3, .. }));
    assert!(err.is_transient());
    assert!(store.get("OBJ_FB_1").is_none());

    // The failed fetch is not left in flight
    let err = coordinator.get_detail("OBJ_FB_1").await.unwrap_err();
    assert!(matches!(err, CatalogError::Fetch { .. }));
    assert_eq!(source.detail_calls("OBJ_FB_1"), 6);
}

#[tokio::test]
async fn test_bulk_fetch_collects_failures() {
    init_test_logging();
    let objects = numbered("FB", "Fahrbahn", 12);
    let failing = objects[4].id.clone();
    let source = MockSource::with_objects(objects.clone());
    source.fail_id(&failing);
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();

    let ids: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
    let stats = coordinator.bulk_fetch_details(&ids, 5, None).await.unwrap();

    assert_eq!(stats.attempted, 12);
    assert_eq!(stats.succeeded, 11);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failed_ids, vec![failing.clone()]);
    assert_eq!(store.detail_count(), 11);
    for id in &ids {
        assert_eq!(store.has_detail(id), *id != failing, "{id}");
    }
}

#[tokio::test]
async fn test_bulk_fetch_stays_within_max_concurrency() {
    init_test_logging();
    let objects = numbered("FB", "Fahrbahn", 40);
    let source = MockSource::with_objects(objects.clone());
    source.set_detail_delay(Duration::from_millis(5));
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();

    let ids: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
    let stats = coordinator.bulk_fetch_details(&ids, 5, None).await.unwrap();

    assert_eq!(stats.succeeded, 40);
    assert_eq!(store.detail_count(), 40);
    let peak = source.peak_concurrent_details();
    assert!(peak <= 5, "peak {peak} exceeds the pool size");
    assert!(peak > 1, "fetches never overlapped");
}

#[tokio::test]
async fn test_bulk_fetch_with_single_worker_is_sequential() {
    let objects = numbered("HB", "Hochbau", 6);
    let source = MockSource::with_objects(objects.clone());
    source.set_detail_delay(Duration::from_millis(2));
    let (coordinator, _store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();

    let ids: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
    let stats = coordinator.bulk_fetch_details(&ids, 1, None).await.unwrap();

    assert_eq!(stats.succeeded, 6);
    assert_eq!(source.peak_concurrent_details(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_get_detail_still_persists() {
    let source = MockSource::with_objects(vec![summary("OBJ_FB_1", "Gleisrost", "Fahrbahn")]);
    source.set_detail_delay(Duration::from_millis(50));
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(5), coordinator.get_detail("OBJ_FB_1")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.has_detail("OBJ_FB_1"));

    let (_, origin) = coordinator.resolve("OBJ_FB_1", Language::De).await.unwrap();
    assert_eq!(origin, Origin::Cache);
    assert_eq!(source.detail_calls("OBJ_FB_1"), 1);
}

#[tokio::test]
async fn test_bulk_fetch_skips_detail_and_other_domains() {
    let mut objects = numbered("FB", "Fahrbahn", 3);
    objects.extend(numbered("HB", "Hochbau", 2));
    let source = MockSource::with_objects(objects.clone());
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();
    store.put(detail_of(&objects[0])).unwrap();

    let ids: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
    let stats = coordinator
        .bulk_fetch_details(&ids, 2, Some("fahrbahn"))
        .await
        .unwrap();

    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.skipped, 3);
    assert_eq!(source.detail_calls(&objects[0].id), 0);
    assert_eq!(source.detail_calls(&objects[3].id), 0);
}

#[tokio::test]
async fn test_update_missing_fetches_only_summaries() {
    let objects = numbered("FB", "Fahrbahn", 4);
    let source = MockSource::with_objects(objects.clone());
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();
    store.put(detail_of(&objects[0])).unwrap();

    let stats = coordinator.update_missing(None, false, 4).await.unwrap();
    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(store.detail_count(), 4);
    assert_eq!(source.detail_calls(&objects[0].id), 0);
    assert_eq!(source.listing_calls(), 1);
}

#[tokio::test]
async fn test_update_missing_force_refresh_refetches_everything() {
    let objects = numbered("FB", "Fahrbahn", 3);
    let source = MockSource::with_objects(objects.clone());
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.update_missing(None, false, 3).await.unwrap();
    assert_eq!(store.detail_count(), 3);

    let stats = coordinator.update_missing(None, true, 3).await.unwrap();
    assert_eq!(stats.attempted, 3);
    assert_eq!(source.listing_calls(), 2);
    assert_eq!(source.detail_calls(&objects[0].id), 2);
    assert_eq!(store.detail_count(), 3);
}

#[tokio::test]
async fn test_download_all_refetches_held_detail() {
    let objects = numbered("FB", "Fahrbahn", 3);
    let source = MockSource::with_objects(objects.clone());
    let (coordinator, store) = coordinator_with_store(Arc::clone(&source));
    coordinator.ensure_fresh(DAY).await.unwrap();
    store.put(detail_of(&objects[0])).unwrap();

    let stats = coordinator.download_all(None, 3).await.unwrap();
    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(source.detail_calls(&objects[0].id), 1);
}

#[tokio::test]
async fn test_without_store() {
    let objects = numbered("FB", "Fahrbahn", 3);
    let source = MockSource::with_objects(objects.clone());
    let coordinator =
        CacheCoordinator::new(source.clone(), None, Language::De).with_retry(RetryPolicy::immediate(2));

    let refresh = coordinator.ensure_fresh(DAY).await.unwrap();
    assert!(!refresh.refreshed);
    assert_eq!(source.listing_calls(), 0);

    let snapshot = coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 3);

    let update = coordinator.update_missing(None, false, 2).await.unwrap();
    assert_eq!(update.attempted, 0);

    let (_, origin) = coordinator.resolve(&objects[0].id, Language::De).await.unwrap();
    assert_eq!(origin, Origin::Remote);
    let (_, origin) = coordinator.resolve(&objects[0].id, Language::De).await.unwrap();
    assert_eq!(origin, Origin::Remote);
    assert_eq!(source.detail_calls(&objects[0].id), 2);
}

#[tokio::test]
async fn test_persisted_detail_survives_reopen() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let objects = numbered("FB", "Fahrbahn", 2);
    let source = MockSource::with_objects(objects.clone());

    {
        let store = Arc::new(CatalogStore::open_dir(temp_dir.path()).unwrap());
        let coordinator = CacheCoordinator::new(source.clone(), Some(store), Language::De)
            .with_retry(RetryPolicy::immediate(1));
        coordinator.update_missing(None, false, 2).await.unwrap();
    }

    let store = Arc::new(CatalogStore::open_dir(temp_dir.path()).unwrap());
    let coordinator =
        CacheCoordinator::new(source.clone(), Some(store), Language::De).with_max_age(DAY);
    coordinator.refresh_if_stale().await.unwrap();
    let (_, origin) = coordinator.resolve(&objects[1].id, Language::De).await.unwrap();

    assert_eq!(origin, Origin::Cache);
    assert_eq!(source.listing_calls(), 1);
    assert_eq!(source.detail_calls(&objects[1].id), 1);
}
