// src/cleaner.rs
//! Retention-window eviction for creator pools.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::model::CreatorPool;
use crate::telemetry::ITEMS_EVICTED_TOTAL;

fn default_retention_days() -> u64 {
    30
}
fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanerConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Period of the background cleanup task.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl CleanerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 3600))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Drop items published before `now - retention`, except ids in `pinned`.
/// Returns the pruned pool and the number of items removed.
pub fn evict(
    pool: CreatorPool,
    retention: Duration,
    now: DateTime<Utc>,
    pinned: &HashSet<String>,
) -> (CreatorPool, usize) {
    let window = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let Some(cutoff) = now.checked_sub_signed(window) else {
        return (pool, 0);
    };
    let CreatorPool {
        creator_id,
        items,
        fetched_at,
    } = pool;
    let before = items.len();
    let items: Vec<_> = items
        .into_iter()
        .filter(|it| it.published_at >= cutoff || pinned.contains(&it.id))
        .collect();
    let removed = before - items.len();
    (
        CreatorPool {
            creator_id,
            items,
            fetched_at,
        },
        removed,
    )
}

pub struct StalenessCleaner {
    cfg: CleanerConfig,
    clock: Arc<dyn Clock>,
}

impl StalenessCleaner {
    pub fn new(cfg: CleanerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { cfg, clock }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.cfg
    }

    pub fn evict_pool(&self, pool: CreatorPool, pinned: &HashSet<String>) -> (CreatorPool, usize) {
        let (pool, removed) = evict(pool, self.cfg.retention(), self.clock.now(), pinned);
        if removed > 0 {
            counter!(ITEMS_EVICTED_TOTAL).increment(removed as u64);
            debug!(target: "cleaner", creator = %pool.creator_id, removed, kept = pool.len(), "stale items evicted");
        }
        (pool, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{ContentItem, ContentMetrics, ContentType};

    fn item(id: &str, at: DateTime<Utc>) -> ContentItem {
        ContentItem {
            id: id.into(),
            creator_id: "p:c".into(),
            title: id.into(),
            description: None,
            thumbnail: None,
            url: format!("https://example.invalid/{id}"),
            published_at: at,
            metrics: ContentMetrics::default(),
            duration_seconds: 60,
            kind: ContentType::Video,
        }
    }

    #[test]
    fn evicts_only_outside_window() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let pool = CreatorPool::from_items(
            "p:c",
            vec![
                item("new", now - chrono::Duration::days(1)),
                item("edge", now - chrono::Duration::days(30)),
                item("old", now - chrono::Duration::days(31)),
            ],
        );
        let (out, removed) = evict(pool, CleanerConfig::default().retention(), now, &HashSet::new());
        assert_eq!(removed, 1);
        let ids: Vec<_> = out.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["new", "edge"]);
    }

    #[test]
    fn pinned_items_survive() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let cleaner = StalenessCleaner::new(CleanerConfig::default(), clock);
        let pool = CreatorPool::from_items(
            "p:c",
            vec![
                item("old-a", now - chrono::Duration::days(60)),
                item("old-b", now - chrono::Duration::days(90)),
            ],
        );
        let pinned: HashSet<String> = ["old-a".to_string()].into_iter().collect();
        let (out, removed) = cleaner.evict_pool(pool, &pinned);
        assert_eq!(removed, 1);
        assert_eq!(out.items[0].id, "old-a");
    }
}
