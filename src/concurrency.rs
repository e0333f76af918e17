//! Per-cache write serialization
//!
//! Only one patch application may run against a given cache entry at a time.
//! Readers never take these locks: they hold a published overlay snapshot.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Lock registry keyed by cache identity (the cache file stem)
pub struct CacheLockManager {
    /// Map from cache identity to its writer lock
    locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CacheLockManager {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the writer lock for a cache entry
    pub fn get_lock(&self, cache_key: &str) -> Arc<Mutex<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(cache_key) {
                return lock.clone();
            }
        }

        // Double-check after acquiring write lock (another thread might have created it)
        let mut map = self.locks.write();
        map.entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for CacheLockManager {
    fn default() -> Self {
        Self::new()
    }
}
