//! In-process [`Cache`] used by tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use reconcile_shared::Result;

use crate::{Cache, CacheStats};

#[derive(Default)]
struct Inner {
    kv: HashMap<String, String>,
    hashes: HashMap<String, BTreeMap<String, String>>,
}

/// A [`Cache`] held entirely in memory.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds consistent maps; every write is a single insert.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.lock();
        if inner.kv.contains_key(key) {
            return Ok(false);
        }
        inner.kv.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hash_set(&self, key: &str, fields: &BTreeMap<String, String>) -> Result<()> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_scan(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let inner = self.lock();
        Ok(CacheStats {
            entries: inner.kv.len() as u64,
            hashes: inner.hashes.len() as u64,
            hash_fields: inner.hashes.values().map(|h| h.len() as u64).sum(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.kv.clear();
        inner.hashes.clear();
        Ok(())
    }
}
