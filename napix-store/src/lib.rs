//! Keyed persistent stores, the default persistence abstraction for
//! managers.
//!
//! A [`Backend`] is a factory of [`Store`]s, one per *collection name*. Two
//! disk layouts are provided: [`FileBackend`](file::FileBackend) keeps each
//! collection as a single JSON blob, [`DirectoryBackend`](dir::DirectoryBackend)
//! keeps one JSON file per key. The [`StorePool`] shares open stores by
//! name across requests for the lifetime of the process.

pub mod dir;
pub mod file;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use napix_core::manager::ManagerError;

pub use dir::{DirectoryBackend, DirectoryStore};
pub use file::{FileBackend, FileStore};

/// Errors that can occur in the storage layer.
#[derive(Debug)]
pub enum StoreError {
    /// The key does not exist in the collection.
    Missing(String),
    /// The operation is not supported by this store kind.
    Unsupported(&'static str),
    /// A key or collection name that cannot be mapped to the disk layout.
    InvalidName(String),
    Io(std::io::Error),
    Serde(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Missing(key) => write!(f, "No key `{key}`"),
            StoreError::Unsupported(op) => write!(f, "`{op}` is not supported by this store"),
            StoreError::InvalidName(name) => write!(f, "Invalid store name `{name}`"),
            StoreError::Io(err) => write!(f, "Store I/O error: {err}"),
            StoreError::Serde(msg) => write!(f, "Store serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(key) => ManagerError::NotFound(key),
            other => ManagerError::Internal(other.to_string()),
        }
    }
}

/// A keyed mapping from strings to JSON values, persisted per collection.
///
/// `save` is the commit point: mutations are visible to the owning handle
/// immediately but reach the disk when `save` runs (the directory store
/// writes through and `save` is a no-op there).
pub trait Store: Send {
    fn get(&self, key: &str) -> Result<Value, StoreError>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;

    fn delete(&mut self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keys()?.iter().any(|known| known == key))
    }

    /// Flush to persistent storage.
    fn save(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Remove the whole collection, on disk included.
    fn drop_collection(&mut self) -> Result<(), StoreError>;

    /// Atomically add `by` to an integer value, treating a missing key
    /// as 0. Stores that cannot support this report `Unsupported`.
    fn incr(&mut self, _key: &str, _by: i64) -> Result<i64, StoreError> {
        Err(StoreError::Unsupported("incr"))
    }
}

/// Factory of stores for one disk layout rooted somewhere.
pub trait Backend: Send + Sync {
    /// The collection names currently present.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn open(&self, collection: &str) -> Result<Box<dyn Store>, StoreError>;
}

/// A shared handle on an open store.
pub type SharedStore = Arc<Mutex<Box<dyn Store>>>;

/// Process-lifetime registry of open stores, shared by collection name
/// across requests.
pub struct StorePool {
    backend: Arc<dyn Backend>,
    open: DashMap<String, SharedStore>,
}

impl StorePool {
    pub fn new(backend: impl Backend + 'static) -> Self {
        StorePool {
            backend: Arc::new(backend),
            open: DashMap::new(),
        }
    }

    /// The store for `collection`, opened on first use.
    pub fn collection(&self, collection: &str) -> Result<SharedStore, StoreError> {
        if let Some(store) = self.open.get(collection) {
            return Ok(store.clone());
        }
        let store = Arc::new(Mutex::new(self.backend.open(collection)?));
        Ok(self
            .open
            .entry(collection.to_string())
            .or_insert(store)
            .clone())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

pub(crate) fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('/') || name.starts_with('.') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
