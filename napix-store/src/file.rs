//! Blob-per-collection storage.
//!
//! Each collection is one JSON object file under the backend root. The
//! whole map lives in memory while the store is open; `save` rewrites the
//! file with a write-then-rename, serialised by a per-collection mutex
//! shared through the backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::Value;

use crate::{check_name, Backend, Store, StoreError};

pub struct FileBackend {
    root: PathBuf,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileBackend {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(FileBackend {
            root,
            write_locks: DashMap::new(),
        })
    }

    fn write_lock(&self, collection: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(collection.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Backend for FileBackend {
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut collections = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_file() {
                collections.push(name.to_string());
            }
        }
        collections.sort();
        Ok(collections)
    }

    fn open(&self, collection: &str) -> Result<Box<dyn Store>, StoreError> {
        check_name(collection)?;
        Ok(Box::new(FileStore::open(
            collection,
            self.root.join(collection),
            self.write_lock(collection),
        )?))
    }
}

pub struct FileStore {
    name: String,
    path: PathBuf,
    data: BTreeMap<String, Value>,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    fn open(
        name: &str,
        path: PathBuf,
        write_lock: Arc<Mutex<()>>,
    ) -> Result<FileStore, StoreError> {
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| StoreError::Serde(err.to_string()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(FileStore {
            name: name.to_string(),
            path,
            data,
            write_lock,
        })
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.data
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Missing(key.to_string()))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.data
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::Missing(key.to_string()))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.data.keys().cloned().collect())
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());
        let bytes = serde_json::to_vec_pretty(&self.data)
            .map_err(|err| StoreError::Serde(err.to_string()))?;
        // Dotfile so a crash between write and rename never surfaces a
        // half-written blob as a collection.
        let tmp = self.path.with_file_name(format!(".{}.tmp", self.name));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn drop_collection(&mut self) -> Result<(), StoreError> {
        self.data.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn incr(&mut self, key: &str, by: i64) -> Result<i64, StoreError> {
        let current = match self.data.get(key) {
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::Serde(format!("`{key}` is not an integer")))?,
            None => 0,
        };
        let next = current + by;
        self.data.insert(key.to_string(), Value::from(next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn save_then_reopen_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();

        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!({"port": 80})).unwrap();
        store.save().unwrap();
        drop(store);

        let store = backend.open("servers").unwrap();
        assert_eq!(store.get("web1").unwrap(), json!({"port": 80}));
    }

    #[test]
    fn unsaved_mutations_stay_in_memory() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();

        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();
        drop(store);

        let store = backend.open("servers").unwrap();
        assert!(matches!(store.get("web1"), Err(StoreError::Missing(_))));
    }

    #[test]
    fn backend_lists_saved_collections_only() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();
        std::fs::write(root.path().join(".hidden"), b"{}").unwrap();
        std::fs::create_dir(root.path().join("subdir")).unwrap();

        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();
        store.save().unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["servers".to_string()]);
    }

    #[test]
    fn missing_key_and_delete_semantics() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();

        assert!(matches!(store.get("nope"), Err(StoreError::Missing(_))));
        assert!(matches!(store.delete("nope"), Err(StoreError::Missing(_))));

        store.set("web1", json!(1)).unwrap();
        assert!(store.contains("web1").unwrap());
        store.delete("web1").unwrap();
        assert!(!store.contains("web1").unwrap());
    }

    #[test]
    fn incr_counts_from_zero() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();
        let mut store = backend.open("counters").unwrap();

        assert_eq!(store.incr("hits", 2).unwrap(), 2);
        assert_eq!(store.incr("hits", 3).unwrap(), 5);

        store.set("label", json!("text")).unwrap();
        assert!(store.incr("label", 1).is_err());
    }

    #[test]
    fn drop_removes_the_blob() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();
        store.save().unwrap();

        store.drop_collection().unwrap();
        assert!(backend.keys().unwrap().is_empty());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn collection_names_are_checked() {
        let root = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(root.path()).unwrap();
        assert!(matches!(
            backend.open("../escape"),
            Err(StoreError::InvalidName(_))
        ));
    }
}
