//! In-process cache store. Expired entries are dropped on read or by
//! [`MemoryCacheStore::purge_expired`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{CacheEntry, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry<serde_json::Value>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut g = self.entries.lock();
        let before = g.len();
        g.retain(|_, e| !e.is_expired(now));
        before - g.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let now = self.clock.now();
        let mut g = self.entries.lock();
        match g.get(key) {
            Some(e) if e.is_expired(now) => {
                g.remove(key);
                tracing::trace!(target: "cache", key, "expired entry dropped");
                Ok(None)
            }
            Some(e) => Ok(Some(e.data.clone())),
            None => Ok(None),
        }
    }

    async fn set_value(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
