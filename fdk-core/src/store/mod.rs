//! Persistent object store
//!
//! Durable storage of catalog objects plus one metadata record. The store
//! keeps an id-ordered in-memory index that is loaded once when the store
//! is opened and updated write-through on every change.
//!
//! Guarantees:
//! - `put` never downgrades a detail record to a summary
//! - the metadata record is written as one blob, never partially
//! - unreadable records are skipped on load (logged), never fatal

mod backend;
mod metadata;

pub use backend::{FsBackend, MemoryBackend, StoreBackend};
pub use metadata::StoreMetadata;

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::model::{CatalogObject, Completeness};

const OBJECTS_PREFIX: &str = "objects/";
const METADATA_KEY: &str = "metadata";

/// What `put` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The id was not stored before
    Inserted,
    /// An existing record was replaced
    Replaced,
    /// A summary was offered for an id that already holds detail
    KeptDetail,
}

/// Counts from [`CatalogStore::put_batch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub kept_detail: usize,
}

/// Catalog object store over a [`StoreBackend`]
pub struct CatalogStore {
    backend: Box<dyn StoreBackend>,
    objects: RwLock<BTreeMap<String, CatalogObject>>,
    metadata: RwLock<StoreMetadata>,
    /// Serializes read-check-write sequences on the backend
    write_lock: Mutex<()>,
}

impl CatalogStore {
    /// Open a file-system store rooted at `dir`
    pub fn open_dir(dir: &Path) -> Result<Self, StorageError> {
        Self::open(Box::new(FsBackend::new(dir)?))
    }

    /// Open an ephemeral in-memory store
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            objects: RwLock::new(BTreeMap::new()),
            metadata: RwLock::new(StoreMetadata::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store over any backend, loading every readable record
    pub fn open(backend: Box<dyn StoreBackend>) -> Result<Self, StorageError> {
        let mut objects = BTreeMap::new();
        let mut skipped = 0usize;

        for key in backend.keys(OBJECTS_PREFIX)? {
            let Some(bytes) = backend.read(&key) else {
                skipped += 1;
                continue;
            };
            match serde_json::from_slice::<CatalogObject>(&bytes) {
                Ok(obj) if !obj.id.is_empty() => {
                    objects.insert(obj.id.clone(), obj);
                }
                Ok(_) => {
                    warn!("Skipping cache record {} without an id", key);
                    skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping corrupt cache record {}: {}", key, e);
                    skipped += 1;
                }
            }
        }

        let metadata = match backend.read(METADATA_KEY) {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Ignoring corrupt cache metadata: {}", e);
                StoreMetadata::default()
            }),
            None => StoreMetadata::default(),
        };

        info!(
            "Opened catalog store at {} ({} objects, {} skipped)",
            backend.location(),
            objects.len(),
            skipped
        );

        Ok(Self {
            backend,
            objects: RwLock::new(objects),
            metadata: RwLock::new(metadata),
            write_lock: Mutex::new(()),
        })
    }

    fn objects(&self) -> RwLockReadGuard<'_, BTreeMap<String, CatalogObject>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn objects_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, CatalogObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Percent-encoded, so distinct ids never share a backend key
    fn object_key(id: &str) -> String {
        let encoded = urlencoding::encode(id)
            .replace('.', "%2E")
            .replace('~', "%7E");
        format!("{OBJECTS_PREFIX}{encoded}")
    }

    /// Best available record for `id`
    pub fn get(&self, id: &str) -> Option<CatalogObject> {
        self.objects().get(id).cloned()
    }

    pub fn completeness(&self, id: &str) -> Option<Completeness> {
        self.objects().get(id).map(|o| o.completeness)
    }

    pub fn has_detail(&self, id: &str) -> bool {
        self.completeness(id) == Some(Completeness::Detail)
    }

    /// Upsert a record, never replacing detail with a summary
    pub fn put(&self, object: CatalogObject) -> Result<PutOutcome, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let outcome = self.put_record(object)?;
        if outcome == PutOutcome::Inserted {
            self.persist_metadata()?;
        }
        Ok(outcome)
    }

    /// Upsert many records, writing the metadata record once at the end
    pub fn put_batch(
        &self,
        objects: impl IntoIterator<Item = CatalogObject>,
    ) -> Result<BatchOutcome, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut outcome = BatchOutcome::default();
        for object in objects {
            match self.put_record(object)? {
                PutOutcome::Inserted => outcome.inserted += 1,
                PutOutcome::Replaced => outcome.replaced += 1,
                PutOutcome::KeptDetail => outcome.kept_detail += 1,
            }
        }
        if outcome.inserted > 0 {
            self.persist_metadata()?;
        }
        Ok(outcome)
    }

    /// Caller holds `write_lock`
    fn put_record(&self, object: CatalogObject) -> Result<PutOutcome, StorageError> {
        if object.id.trim().is_empty() {
            return Err(StorageError::InvalidRecord {
                reason: format!("object '{}' has an empty id", object.name),
            });
        }

        let existing = self.completeness(&object.id);
        if existing == Some(Completeness::Detail) && !object.is_detail() {
            debug!("Keeping detail record for {}", object.id);
            return Ok(PutOutcome::KeptDetail);
        }

        let key = Self::object_key(&object.id);
        let bytes = serde_json::to_vec(&object).map_err(|source| StorageError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.backend.write(&key, &bytes)?;

        let id = object.id.clone();
        self.objects_mut().insert(id.clone(), object);

        self.metadata
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .known_object_ids
            .insert(id);

        Ok(match existing {
            Some(_) => PutOutcome::Replaced,
            None => PutOutcome::Inserted,
        })
    }

    /// All records in id order
    pub fn list_all(&self) -> Vec<CatalogObject> {
        self.objects().values().cloned().collect()
    }

    /// Ids in id order, optionally restricted to one completeness state
    pub fn ids(&self, completeness: Option<Completeness>) -> Vec<String> {
        self.objects()
            .values()
            .filter(|o| completeness.map_or(true, |c| o.completeness == c))
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    pub fn detail_count(&self) -> usize {
        self.objects().values().filter(|o| o.is_detail()).count()
    }

    pub fn get_metadata(&self) -> StoreMetadata {
        self.metadata
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the metadata record with a single blob write
    pub fn set_metadata(&self, metadata: StoreMetadata) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_metadata(&metadata)?;
        *self.metadata.write().unwrap_or_else(|e| e.into_inner()) = metadata;
        Ok(())
    }

    fn persist_metadata(&self) -> Result<(), StorageError> {
        let metadata = self.get_metadata();
        self.write_metadata(&metadata)
    }

    fn write_metadata(&self, metadata: &StoreMetadata) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(metadata).map_err(|source| {
            StorageError::Serialize {
                key: METADATA_KEY.to_string(),
                source,
            }
        })?;
        self.backend.write(METADATA_KEY, &bytes)
    }

    /// Whether the last listing refresh is younger than `max_age`
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.get_metadata().is_fresh_at(max_age, Utc::now())
    }

    /// Downgrade every detail record to a summary (forced refresh)
    ///
    /// Returns the number of records downgraded.
    pub fn reset_details(&self) -> Result<usize, StorageError> {
        let detail_ids = self.ids(Some(Completeness::Detail));
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        for id in &detail_ids {
            let Some(summary) = self.get(id).map(strip_detail) else {
                continue;
            };
            let key = Self::object_key(id);
            let bytes = serde_json::to_vec(&summary).map_err(|source| {
                StorageError::Serialize {
                    key: key.clone(),
                    source,
                }
            })?;
            self.backend.write(&key, &bytes)?;
            self.objects_mut().insert(id.clone(), summary);
        }

        if !detail_ids.is_empty() {
            info!("Reset {} detail records to summary", detail_ids.len());
        }
        Ok(detail_ids.len())
    }

    /// Remove every record and the metadata
    pub fn clear(&self) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let keys = self.backend.keys(OBJECTS_PREFIX)?;
        for key in &keys {
            self.backend.remove(key)?;
        }
        self.backend.remove(METADATA_KEY)?;

        let removed = {
            let mut objects = self.objects_mut();
            let n = objects.len();
            objects.clear();
            n
        };
        *self.metadata.write().unwrap_or_else(|e| e.into_inner()) = StoreMetadata::default();

        info!("Cleared catalog store ({} objects)", removed);
        Ok(removed)
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }
}

/// Drop everything only a detail fetch provides
fn strip_detail(mut object: CatalogObject) -> CatalogObject {
    object.completeness = Completeness::Summary;
    object.description = None;
    object.property_sets.clear();
    object.component_relationships.clear();
    object.assembly_relationships.clear();
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Property, PropertySet, ReleaseInfo};
    use tempfile::TempDir;

    fn summary(id: &str, domain: &str) -> CatalogObject {
        CatalogObject::summary(id, format!("Name {id}"), domain)
    }

    fn detail(id: &str, domain: &str) -> CatalogObject {
        let mut obj = summary(id, domain).into_detail();
        obj.description = Some("Beschreibung".to_string());
        obj.property_sets = vec![PropertySet::new(
            "PS_1",
            "SBB-CFF-FFS_PO_Allgemein",
            vec![Property::new("P_1", "Material")],
        )];
        obj
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = CatalogStore::in_memory();
        assert_eq!(store.put(detail("OBJ_1", "Fahrbahn")).unwrap(), PutOutcome::Inserted);

        let got = store.get("OBJ_1").unwrap();
        assert!(got.is_detail());
        assert_eq!(got.property_sets.len(), 1);
        assert!(store.get("OBJ_2").is_none());
    }

    #[test]
    fn test_put_never_downgrades_detail() {
        let store = CatalogStore::in_memory();
        store.put(detail("OBJ_1", "Fahrbahn")).unwrap();

        let outcome = store.put(summary("OBJ_1", "Fahrbahn")).unwrap();
        assert_eq!(outcome, PutOutcome::KeptDetail);
        assert!(store.get("OBJ_1").unwrap().is_detail());
    }

    #[test]
    fn test_detail_replaces_detail_and_summary() {
        let store = CatalogStore::in_memory();
        store.put(summary("OBJ_1", "Fahrbahn")).unwrap();
        assert_eq!(store.put(detail("OBJ_1", "Fahrbahn")).unwrap(), PutOutcome::Replaced);

        let mut newer = detail("OBJ_1", "Fahrbahn");
        newer.name = "Renamed".to_string();
        assert_eq!(store.put(newer).unwrap(), PutOutcome::Replaced);
        assert_eq!(store.get("OBJ_1").unwrap().name, "Renamed");
    }

    #[test]
    fn test_rejects_empty_id() {
        let store = CatalogStore::in_memory();
        let err = store.put(summary(" ", "Fahrbahn")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
    }

    #[test]
    fn test_list_all_is_id_ordered() {
        let store = CatalogStore::in_memory();
        store.put(summary("OBJ_C", "X")).unwrap();
        store.put(summary("OBJ_A", "X")).unwrap();
        store.put(detail("OBJ_B", "X")).unwrap();

        let ids: Vec<String> = store.list_all().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["OBJ_A", "OBJ_B", "OBJ_C"]);
        assert_eq!(store.ids(Some(Completeness::Summary)), vec!["OBJ_A", "OBJ_C"]);
        assert_eq!(store.detail_count(), 1);
    }

    #[test]
    fn test_put_batch_counts() {
        let store = CatalogStore::in_memory();
        store.put(detail("OBJ_1", "X")).unwrap();

        let outcome = store
            .put_batch(vec![summary("OBJ_1", "X"), summary("OBJ_2", "X"), summary("OBJ_3", "X")])
            .unwrap();
        assert_eq!(
            outcome,
            BatchOutcome {
                inserted: 2,
                replaced: 0,
                kept_detail: 1
            }
        );
        assert!(store.has_detail("OBJ_1"));
        assert_eq!(store.get_metadata().known_object_ids.len(), 3);
    }

    #[test]
    fn test_put_tracks_known_ids() {
        let store = CatalogStore::in_memory();
        store.put(summary("OBJ_1", "X")).unwrap();
        store.put(summary("OBJ_2", "X")).unwrap();
        let meta = store.get_metadata();
        assert_eq!(meta.known_object_ids.len(), 2);
        assert!(meta.known_object_ids.contains("OBJ_2"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
            store.put(detail("OBJ_1", "Fahrbahn")).unwrap();
            store.put(summary("OBJ_2", "Hochbau")).unwrap();
            let mut meta = store.get_metadata();
            meta.release = Some(ReleaseInfo::new("2024.2", "2024-07-01"));
            meta.last_updated = Some(Utc::now());
            store.set_metadata(meta).unwrap();
        }

        let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.has_detail("OBJ_1"));
        assert!(!store.has_detail("OBJ_2"));
        assert_eq!(
            store.get_metadata().release.unwrap().version_id,
            "2024.2".to_string()
        );
        assert!(store.is_fresh(Duration::from_secs(60)));
    }

    #[test]
    fn test_object_keys_are_distinct() {
        assert_eq!(CatalogStore::object_key("OBJ_FB_1"), "objects/OBJ_FB_1");
        assert_eq!(CatalogStore::object_key("OBJ/1"), "objects/OBJ%2F1");
        assert_ne!(CatalogStore::object_key(".x"), CatalogStore::object_key("x"));
        assert_ne!(CatalogStore::object_key("a b"), CatalogStore::object_key("a_b"));
    }

    #[test]
    fn test_similar_ids_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let ids = ["OBJ/1", "OBJ_1", "OBJ 1", ".OBJ_1", "OBJ_Ä"];
        {
            let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
            for id in ids {
                store.put(detail(id, "Fahrbahn")).unwrap();
            }
            assert_eq!(store.len(), ids.len());
        }

        let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
        assert_eq!(store.len(), ids.len());
        for id in ids {
            assert_eq!(store.get(id).unwrap().id, id);
        }
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
            store.put(summary("OBJ_1", "Fahrbahn")).unwrap();
        }
        std::fs::write(temp_dir.path().join("objects/OBJ_BAD.json"), "{not json").unwrap();
        std::fs::write(temp_dir.path().join("metadata.json"), "garbage").unwrap();

        let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("OBJ_BAD").is_none());
        assert!(!store.is_fresh(Duration::from_secs(3600)));
    }

    #[test]
    fn test_reset_details() {
        let store = CatalogStore::in_memory();
        store.put(detail("OBJ_1", "X")).unwrap();
        store.put(summary("OBJ_2", "X")).unwrap();

        assert_eq!(store.reset_details().unwrap(), 1);
        let obj = store.get("OBJ_1").unwrap();
        assert!(!obj.is_detail());
        assert!(obj.property_sets.is_empty());
        assert_eq!(obj.name, "Name OBJ_1");
        assert_eq!(store.detail_count(), 0);
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::open_dir(temp_dir.path()).unwrap();
        store.put(summary("OBJ_1", "X")).unwrap();
        store.put(detail("OBJ_2", "X")).unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
        assert_eq!(store.get_metadata(), StoreMetadata::default());

        let reopened = CatalogStore::open_dir(temp_dir.path()).unwrap();
        assert!(reopened.is_empty());
    }
}
