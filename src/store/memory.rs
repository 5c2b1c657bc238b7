//! In-process object store.

use std::{
    collections::HashMap,
    ops::Range,
    sync::{Arc, RwLock},
};

use super::{ObjectStore, StoreError, check_range, validate_key};

/// An [`ObjectStore`] held entirely in memory.
///
/// Objects are stored as `Arc<[u8]>`, so range reads copy only the
/// requested slice and `put` swaps the whole object atomically.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the object under `key`; returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut guard = self
            .objects
            .write()
            .map_err(|_| StoreError::Internal("RwLock poisoned".into()))?;
        Ok(guard.remove(key).is_some())
    }

    fn object(&self, key: &str) -> Result<Arc<[u8]>, StoreError> {
        let guard = self
            .objects
            .read()
            .map_err(|_| StoreError::Internal("RwLock poisoned".into()))?;
        guard
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self.object(key)?.to_vec())
    }

    fn get_range(&self, key: &str, range: Range<u64>) -> Result<Vec<u8>, StoreError> {
        let object = self.object(key)?;
        check_range(key, &range, object.len() as u64)?;
        Ok(object[range.start as usize..range.end as usize].to_vec())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let guard = self
            .objects
            .read()
            .map_err(|_| StoreError::Internal("RwLock poisoned".into()))?;
        Ok(guard.contains_key(key))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut guard = self
            .objects
            .write()
            .map_err(|_| StoreError::Internal("RwLock poisoned".into()))?;
        guard.insert(key.to_string(), Arc::from(bytes));
        Ok(())
    }
}
