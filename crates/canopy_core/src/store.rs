//! Persistence traits consumed by the sync engine and clients.
//!
//! The remote repository is the single source of truth; these stores are
//! caches. A successful pull replaces their contents wholesale
//! ([`ObjectStore::replace_all`]), and push never touches them.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::model::{Leaf, Note, Settings};

/// A record addressable by a stable key.
pub trait Record {
    /// Stable lookup key (usually the id).
    fn key(&self) -> &str;
}

impl Record for Note {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Record for Leaf {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Key/value persistence for [`Settings`].
pub trait SettingsStore {
    /// Load settings, falling back to defaults when nothing is stored.
    fn load(&self) -> Result<Settings, CoreError>;
    /// Persist settings.
    fn save(&self, settings: &Settings) -> Result<(), CoreError>;
}

/// Keyed persistence for a record collection.
pub trait ObjectStore<T: Record> {
    /// All records, in insertion order.
    fn load_all(&self) -> Result<Vec<T>, CoreError>;
    /// Drop everything and store exactly `records` (pull semantics).
    fn replace_all(&self, records: &[T]) -> Result<(), CoreError>;
    /// Look up one record.
    fn get(&self, key: &str) -> Result<Option<T>, CoreError>;
    /// Insert or update one record.
    fn put(&self, record: &T) -> Result<(), CoreError>;
    /// Remove one record. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, CoreError>;
}

/// In-memory [`ObjectStore`], used by tests and as a scratch cache.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    records: Mutex<IndexMap<String, T>>,
}

impl<T> MemoryStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(IndexMap::new()),
        }
    }
}

impl<T: Record + Clone> ObjectStore<T> for MemoryStore<T> {
    fn load_all(&self) -> Result<Vec<T>, CoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn replace_all(&self, records: &[T]) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        map.clear();
        for record in records {
            map.insert(record.key().to_string(), record.clone());
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<T>, CoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, record: &T) -> Result<(), CoreError> {
        self.lock()?.insert(record.key().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CoreError> {
        Ok(self.lock()?.shift_remove(key).is_some())
    }
}

impl<T> MemoryStore<T> {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IndexMap<String, T>>, CoreError> {
        self.records
            .lock()
            .map_err(|_| CoreError::Store("memory store poisoned".to_string()))
    }
}
