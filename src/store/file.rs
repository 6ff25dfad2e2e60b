//! File-based store with atomic writes.
//!
//! Stores one JSON document per resource and per key record:
//! ```text
//! <root>/resources/<id>.json
//! <root>/keys/<id>.json
//! ```
//! Writes go to a temp file and are renamed into place. Key record updates
//! are read-modify-write under a process-wide mutex so concurrent unlocks of
//! the same resource never lose a hash.

use crate::protocol::models::{RedemptionKeyRecord, Resource};
use crate::store::{KeyRecordStore, ResourceStore};
use crate::GateError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Longest id accepted as a file name.
const MAX_ID_LEN: usize = 64;

/// File-based resource and key record store.
#[derive(Debug)]
pub struct FileStore {
    resources_dir: PathBuf,
    keys_dir: PathBuf,
    record_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store under `dirs::data_dir()/<namespace>/`.
    pub fn with_namespace(namespace: &str) -> Result<Self, GateError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| GateError::StoreIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace))
    }

    /// Create a store rooted at a specific path.
    pub fn with_path(root: impl AsRef<Path>) -> Result<Self, GateError> {
        let root = root.as_ref();
        let resources_dir = root.join("resources");
        let keys_dir = root.join("keys");

        for dir in [&resources_dir, &keys_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| GateError::StoreIO(format!("Failed to create store dir: {}", e)))?;
        }

        Ok(Self {
            resources_dir,
            keys_dir,
            record_lock: Mutex::new(()),
        })
    }

    /// Path for an id inside `dir`, or `None` if the id is not a safe file name.
    fn document_path(dir: &Path, id: &str) -> Option<PathBuf> {
        let safe = !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        safe.then(|| dir.join(format!("{}.json", id)))
    }

    fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), GateError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| GateError::StoreIO(format!("Failed to serialize: {}", e)))?;
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, json)
            .map_err(|e| GateError::StoreIO(format!("Failed to write temp file: {}", e)))?;
        fs::rename(&temp_path, path)
            .map_err(|e| GateError::StoreIO(format!("Failed to rename document: {}", e)))?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, GateError> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)
            .map_err(|e| GateError::StoreIO(format!("Failed to read document: {}", e)))?;
        let value = serde_json::from_str(&json)
            .map_err(|e| GateError::StoreIO(format!("Failed to parse document: {}", e)))?;
        Ok(Some(value))
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, ()>, GateError> {
        self.record_lock
            .lock()
            .map_err(|_| GateError::StoreIO("Key record lock poisoned".to_string()))
    }
}

impl ResourceStore for FileStore {
    fn put(&self, resource: &Resource) -> Result<(), GateError> {
        let path = Self::document_path(&self.resources_dir, &resource.id).ok_or_else(|| {
            GateError::StoreIO(format!("Unsafe resource id: {:?}", resource.id))
        })?;
        Self::write_atomic(&path, resource)
    }

    fn get(&self, id: &str) -> Result<Option<Resource>, GateError> {
        match Self::document_path(&self.resources_dir, id) {
            Some(path) => Self::read(&path),
            None => Ok(None),
        }
    }
}

impl KeyRecordStore for FileStore {
    fn append_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GateError> {
        let path = Self::document_path(&self.keys_dir, resource_id).ok_or_else(|| {
            GateError::StoreIO(format!("Unsafe resource id: {:?}", resource_id))
        })?;

        let _guard = self.lock_records()?;
        let mut record: RedemptionKeyRecord =
            Self::read(&path)?.unwrap_or_else(|| RedemptionKeyRecord::new(resource_id, now));
        record.key_hashes.insert(key_hash.to_string());
        record.updated_at = now;
        Self::write_atomic(&path, &record)
    }

    fn get_record(&self, resource_id: &str) -> Result<Option<RedemptionKeyRecord>, GateError> {
        match Self::document_path(&self.keys_dir, resource_id) {
            Some(path) => Self::read(&path),
            None => Ok(None),
        }
    }

    fn remove_hash(
        &self,
        resource_id: &str,
        key_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError> {
        let Some(path) = Self::document_path(&self.keys_dir, resource_id) else {
            return Ok(false);
        };

        let _guard = self.lock_records()?;
        let Some(mut record) = Self::read::<RedemptionKeyRecord>(&path)? else {
            return Ok(false);
        };
        if !record.key_hashes.remove(key_hash) {
            return Ok(false);
        }
        record.updated_at = now;
        Self::write_atomic(&path, &record)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            payload: b"print(1)".to_vec(),
            access_token: "tok".to_string(),
            unlock_url: Some("https://unlock.test/x".to_string()),
            created_at: now(),
        }
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path()).unwrap();

        store.put(&resource("a1b2")).unwrap();
        assert_eq!(store.get("a1b2").unwrap(), Some(resource("a1b2")));
    }

    #[test]
    fn test_file_store_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path()).unwrap();
        assert!(store.get("missing").unwrap().is_none());
        assert!(store.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path()).unwrap();

        assert!(store.get("../keys/x").unwrap().is_none());
        assert!(store.get("").unwrap().is_none());
        assert!(matches!(
            store.put(&resource("../escape")),
            Err(GateError::StoreIO(_))
        ));
        assert!(matches!(
            store.append_hash("a/b", "h", now()),
            Err(GateError::StoreIO(_))
        ));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileStore::with_path(temp_dir.path()).unwrap();
            store.put(&resource("r1")).unwrap();
            store.append_hash("r1", "h1", now()).unwrap();
        }

        let reopened = FileStore::with_path(temp_dir.path()).unwrap();
        assert!(reopened.get("r1").unwrap().is_some());
        assert!(reopened.get_record("r1").unwrap().unwrap().contains("h1"));
    }

    #[test]
    fn test_file_store_append_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_path(temp_dir.path()).unwrap();

        store.append_hash("r1", "h1", now()).unwrap();
        store.append_hash("r1", "h2", now()).unwrap();
        assert!(store.remove_hash("r1", "h1", now()).unwrap());
        assert!(!store.remove_hash("r1", "h1", now()).unwrap());

        let record = store.get_record("r1").unwrap().unwrap();
        assert!(!record.contains("h1"));
        assert!(record.contains("h2"));
    }

    #[test]
    fn test_file_store_concurrent_appends() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::with_path(temp_dir.path()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..5 {
                        store
                            .append_hash("r1", &format!("h-{}-{}", i, j), now())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_record("r1").unwrap().unwrap().key_hashes.len(), 40);
    }
}
