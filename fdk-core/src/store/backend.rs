//! Persistence substrate: key -> blob
//!
//! Keys are slash-separated (`objects/OBJ_FB_1`, `metadata`). The file
//! system backend maps them to `<root>/<key>.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

use crate::error::StorageError;

/// Blob storage used by [`super::CatalogStore`]
pub trait StoreBackend: Send + Sync {
    /// Read a blob. Unreadable blobs are reported as absent.
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Write a blob, replacing any previous content atomically
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove a blob; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys below `prefix` (e.g. `objects/`), unordered
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Human-readable location for stats output
    fn location(&self) -> String;
}

/// One JSON file per key below a root directory
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut segments = key.split('/').filter(|s| !s.is_empty()).peekable();
        while let Some(segment) = segments.next() {
            let segment = sanitize(segment);
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(format!("{segment}.json"));
            }
        }
        path
    }
}

/// Keep file names portable; record content carries the real id
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '%') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "_".to_string(),
        rest => rest.to_string(),
    }
}

impl StoreBackend for FsBackend {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read cache record {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Write-then-rename so readers never observe a partial record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|source| StorageError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove { path, source }),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.trim_end_matches('/');
        let dir = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(prefix)
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&dir).map_err(|source| StorageError::List {
            path: dir.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::List {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if prefix.is_empty() {
                    keys.push(stem.to_string());
                } else {
                    keys.push(format!("{prefix}/{stem}"));
                }
            }
        }
        Ok(keys)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// In-process blobs; nothing survives the process
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(key).cloned()
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_roundtrip_and_keys() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FsBackend::new(temp_dir.path()).unwrap();

        backend.write("objects/OBJ_FB_1", b"{}").unwrap();
        backend.write("objects/OBJ_FB_2", b"[]").unwrap();
        backend.write("metadata", b"{\"a\":1}").unwrap();

        assert_eq!(backend.read("objects/OBJ_FB_1").unwrap(), b"{}");
        assert!(temp_dir.path().join("objects/OBJ_FB_2.json").exists());
        assert!(temp_dir.path().join("metadata.json").exists());

        let mut keys = backend.keys("objects/").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["objects/OBJ_FB_1", "objects/OBJ_FB_2"]);
    }

    #[test]
    fn test_fs_missing_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FsBackend::new(temp_dir.path()).unwrap();

        assert!(backend.read("objects/none").is_none());
        backend.remove("objects/none").unwrap();
        assert!(backend.keys("objects/").unwrap().is_empty());

        backend.write("objects/X", b"1").unwrap();
        backend.remove("objects/X").unwrap();
        assert!(backend.read("objects/X").is_none());
    }

    #[test]
    fn test_fs_sanitizes_path_segments() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FsBackend::new(temp_dir.path()).unwrap();

        backend.write("objects/../escape", b"1").unwrap();
        assert!(!temp_dir.path().join("escape.json").exists());
        assert!(temp_dir.path().join("objects/_/escape.json").exists());
        assert_eq!(backend.read("objects/../escape").unwrap(), b"1");
    }

    #[test]
    fn test_memory_prefix_filter() {
        let backend = MemoryBackend::new();
        backend.write("objects/A", b"1").unwrap();
        backend.write("metadata", b"2").unwrap();
        assert_eq!(backend.keys("objects/").unwrap(), vec!["objects/A"]);
        assert_eq!(backend.location(), "memory");
    }
}
