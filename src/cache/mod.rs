//! Cache Store contract: TTL'd key/value persistence.
//!
//! The engine persists everything (follow lists, creator pools, display
//! history) through this contract. Values are stored as JSON; typed access
//! goes through [`get_json`] / [`set_json`].

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FeedError, Result};

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

/// Stored envelope around a cached value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            data,
            created_at: now,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `None` on miss or expiry. Expired entries are deleted lazily here.
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set_value(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed read. A stored value that no longer decodes into `T` counts as a miss.
pub async fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get_value(key).await? else {
        return Ok(None);
    };
    match serde_json::from_value::<T>(raw) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(target: "cache", key, error = %e, "cached value no longer decodes; treating as miss");
            Ok(None)
        }
    }
}

pub async fn set_json<T: Serialize + Sync + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    let raw = serde_json::to_value(value).map_err(|e| FeedError::Cache(e.to_string()))?;
    store.set_value(key, raw, ttl).await
}

/// Key scheme shared by every component writing to the store.
pub mod keys {
    pub fn follow_list(platform: &str, user_id: &str) -> String {
        format!("follow:{platform}:{user_id}")
    }

    pub fn creator_pool(platform: &str, creator_id: &str) -> String {
        format!("pool:{platform}:{creator_id}")
    }

    pub fn display_history(platform: &str) -> String {
        format!("history:{platform}")
    }
}
