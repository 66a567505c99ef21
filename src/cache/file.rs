//! File-backed cache store: one JSON file per key, atomic tmp + rename writes.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use super::{CacheEntry, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{FeedError, Result};

pub struct FileCacheStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCacheStore {
    /// Creates `dir` if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(dir, Arc::new(SystemClock))
    }

    pub fn open_with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| FeedError::Cache(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Keys contain `:` and arbitrary ids; hash them into a safe file name.
fn file_stem(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        let body = match fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FeedError::Cache(format!("read {}: {e}", path.display()))),
        };

        let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(&body) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(target: "cache", key, error = %e, "corrupt cache file removed");
                let _ = fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now()) {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(entry.data))
    }

    async fn set_value(&self, key: &str, value: serde_json::Value, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        let json = serde_json::to_vec(&entry).map_err(|e| FeedError::Cache(e.to_string()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| FeedError::Cache(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| FeedError::Cache(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FeedError::Cache(e.to_string())),
        }
    }
}
