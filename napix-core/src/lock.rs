//! Per-resource serialisation of verb invocations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of named async mutexes.
///
/// When a [`CollectionService`](crate::service::Service) carries a lock,
/// the dispatcher acquires the slot named after the request path before
/// invoking the verb and releases it on every exit path. Slots are retained
/// for the process lifetime.
#[derive(Debug, Default)]
pub struct ResourceLock {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl ResourceLock {
    pub fn new() -> Self {
        ResourceLock::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        slot.lock_owned().await
    }
}
