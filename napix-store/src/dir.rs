//! File-per-key storage.
//!
//! Each collection is a subdirectory of the backend root; each key is one
//! JSON file inside it. Writes go straight to disk, so `save` has nothing
//! to do and `incr` cannot be supported.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{check_name, Backend, Store, StoreError};

pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(DirectoryBackend { root })
    }
}

impl Backend for DirectoryBackend {
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut collections = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() {
                collections.push(name.to_string());
            }
        }
        collections.sort();
        Ok(collections)
    }

    fn open(&self, collection: &str) -> Result<Box<dyn Store>, StoreError> {
        check_name(collection)?;
        Ok(Box::new(DirectoryStore {
            dir: self.root.join(collection),
        }))
    }
}

pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    fn file(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains('/') {
            return Err(StoreError::InvalidName(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    fn create_dir(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(&self.dir)
        }
        #[cfg(not(unix))]
        {
            std::fs::create_dir_all(&self.dir)
        }
    }
}

impl Store for DirectoryStore {
    fn get(&self, key: &str) -> Result<Value, StoreError> {
        match std::fs::read(self.file(key)?) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|err| StoreError::Serde(err.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::Missing(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.file(key)?;
        let bytes =
            serde_json::to_vec_pretty(&value).map_err(|err| StoreError::Serde(err.to_string()))?;
        match std::fs::write(&path, &bytes) {
            Ok(()) => Ok(()),
            Err(_) if !self.dir.is_dir() => {
                self.create_dir()?;
                Ok(std::fs::write(&path, &bytes)?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.file(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::Missing(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with('.') {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.file(key)?.is_file())
    }

    fn drop_collection(&mut self) -> Result<(), StoreError> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        let _ = std::fs::remove_dir(&self.dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_file_per_key() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();

        store.set("web1", json!({"port": 80})).unwrap();
        assert!(root.path().join("servers/web1").is_file());
        assert_eq!(store.get("web1").unwrap(), json!({"port": 80}));
    }

    #[cfg(unix)]
    #[test]
    fn collection_dir_is_created_private() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();

        let mode = std::fs::metadata(root.path().join("servers"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn keys_of_missing_collection_are_empty() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let store = backend.open("servers").unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn slash_in_keys_is_forbidden() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        assert!(matches!(
            store.set("a/b", json!(1)),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(store.get("a/b"), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn incr_is_unsupported() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        assert!(matches!(
            store.incr("hits", 1),
            Err(StoreError::Unsupported("incr"))
        ));
    }

    #[test]
    fn missing_and_delete_semantics() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();

        assert!(matches!(store.get("nope"), Err(StoreError::Missing(_))));
        assert!(matches!(store.delete("nope"), Err(StoreError::Missing(_))));

        store.set("web1", json!(1)).unwrap();
        store.delete("web1").unwrap();
        assert!(!store.contains("web1").unwrap());
    }

    #[test]
    fn backend_lists_collection_dirs() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();
        std::fs::write(root.path().join("blob"), b"x").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["servers".to_string()]);
    }

    #[test]
    fn drop_removes_keys_and_dir() {
        let root = tempfile::tempdir().unwrap();
        let backend = DirectoryBackend::new(root.path()).unwrap();
        let mut store = backend.open("servers").unwrap();
        store.set("web1", json!(1)).unwrap();
        store.set("web2", json!(2)).unwrap();

        store.drop_collection().unwrap();
        assert!(!root.path().join("servers").exists());
        assert!(backend.keys().unwrap().is_empty());
    }
}
