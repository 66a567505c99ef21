// src/pool/mod.rs
//! Per-creator content pools: network fetch with a fixed retry budget and
//! incremental merge into the cached pool.

pub mod merge;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::{self, keys, CacheStore};
use crate::clock::Clock;
use crate::error::{FeedError, Result};
use crate::model::{ContentItem, Creator, CreatorPool};
use crate::platform::PlatformClient;
use crate::telemetry::{
    ensure_metrics_described, MERGE_APPLIED_TOTAL, POOL_FETCH_ERRORS_TOTAL, POOL_FETCH_MS,
    POOL_FETCH_TOTAL, RATE_LIMITED_TOTAL,
};

pub use merge::{merge_incremental, merge_with_stats, MergeStats};

/// Upper bound on how long an upstream retry-after hint may stretch one wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

fn default_pool_size() -> usize {
    50
}
fn default_freshness_secs() -> u64 {
    6 * 3600
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Candidates requested per creator (more than will be shown).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// A pool fetched more recently than this is served from cache.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            freshness_secs: default_freshness_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PoolConfig {
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.freshness_secs).unwrap_or(i64::MAX))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Result of one creator refresh. Never an error: a failed creator keeps its
/// cached pool as-is.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Updated {
        pool: CreatorPool,
        stats: MergeStats,
        /// At least one attempt was rate limited before the fetch succeeded.
        rate_limited: bool,
    },
    Abandoned {
        rate_limited: bool,
        last_error: FeedError,
    },
}

impl FetchOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, FetchOutcome::Updated { .. })
    }

    /// Abandoned after the upstream throttled us: the breaker signal.
    pub fn abandoned_rate_limited(&self) -> bool {
        matches!(
            self,
            FetchOutcome::Abandoned {
                rate_limited: true,
                ..
            }
        )
    }
}

pub struct ContentPoolFetcher {
    client: Arc<dyn PlatformClient>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    cfg: PoolConfig,
    pool_ttl: Duration,
}

impl ContentPoolFetcher {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        cfg: PoolConfig,
        pool_ttl: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            client,
            cache,
            clock,
            cfg,
            pool_ttl,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    fn key(&self, creator_id: &str) -> String {
        keys::creator_pool(self.client.platform(), creator_id)
    }

    /// Single network attempt.
    pub async fn fetch_creator_pool(&self, creator: &Creator) -> Result<Vec<ContentItem>> {
        let t0 = Instant::now();
        counter!(POOL_FETCH_TOTAL).increment(1);
        let res = self
            .client
            .fetch_creator_items(creator, self.cfg.pool_size)
            .await;
        histogram!(POOL_FETCH_MS).record(t0.elapsed().as_secs_f64() * 1_000.0);
        if res.is_err() {
            counter!(POOL_FETCH_ERRORS_TOTAL).increment(1);
        }
        res
    }

    /// Cached pool, distinguishing a miss (`Ok(None)`) from a failed read.
    pub async fn read_pool(&self, creator_id: &str) -> Result<Option<CreatorPool>> {
        cache::get_json::<CreatorPool>(self.cache.as_ref(), &self.key(creator_id)).await
    }

    /// Cached pool for display. Read errors count as a miss.
    pub async fn load_pool(&self, creator_id: &str) -> Option<CreatorPool> {
        match self.read_pool(creator_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "pool", creator = creator_id, error = %e, "pool cache read failed");
                None
            }
        }
    }

    pub async fn store_pool(&self, pool: &CreatorPool) -> Result<()> {
        cache::set_json(self.cache.as_ref(), &self.key(&pool.creator_id), pool, self.pool_ttl).await
    }

    /// Merge `fetched` into the cached pool and persist the result.
    ///
    /// Only a true miss starts from an empty pool. A failed read returns the
    /// error and leaves the stored pool untouched.
    pub async fn merge_into_cache(
        &self,
        creator_id: &str,
        fetched: Vec<ContentItem>,
    ) -> Result<(CreatorPool, MergeStats)> {
        let existing = self
            .read_pool(creator_id)
            .await?
            .unwrap_or_else(|| CreatorPool::empty(creator_id));
        let (items, stats) = merge_with_stats(&existing.items, fetched);
        let pool = CreatorPool {
            creator_id: creator_id.to_string(),
            items,
            fetched_at: Some(self.clock.now()),
        };
        self.store_pool(&pool).await?;
        counter!(MERGE_APPLIED_TOTAL).increment(1);
        debug!(
            target: "pool",
            creator = creator_id,
            before = stats.before,
            after = stats.after,
            added = stats.added,
            refreshed = stats.refreshed,
            "merge applied"
        );
        Ok((pool, stats))
    }

    /// Fetch with the fixed attempt budget, then merge. Failures are
    /// contained and reported through the outcome.
    pub async fn refresh_creator(&self, creator: &Creator) -> FetchOutcome {
        let attempts = self.cfg.retry_attempts.max(1);
        let mut rate_limited = false;
        let mut last_error = FeedError::TransientNetwork("no attempt made".into());

        info!(target: "pool", creator = %creator.id, "pool fetch start");
        for attempt in 1..=attempts {
            match self.fetch_creator_pool(creator).await {
                Ok(items) => {
                    let fetched = items.len();
                    return match self.merge_into_cache(&creator.id, items).await {
                        Ok((pool, stats)) => {
                            info!(
                                target: "pool",
                                creator = %creator.id,
                                attempt,
                                fetched,
                                pool = pool.len(),
                                "pool fetch end"
                            );
                            FetchOutcome::Updated {
                                pool,
                                stats,
                                rate_limited,
                            }
                        }
                        Err(e) => {
                            warn!(target: "pool", creator = %creator.id, error = %e, "pool merge failed; cached pool kept");
                            FetchOutcome::Abandoned {
                                rate_limited,
                                last_error: e,
                            }
                        }
                    };
                }
                Err(e) => {
                    let mut wait = self.cfg.retry_delay();
                    if e.is_rate_limited() {
                        rate_limited = true;
                        counter!(RATE_LIMITED_TOTAL).increment(1);
                    }
                    if let FeedError::RateLimited {
                        retry_after: Some(hint),
                    } = &e
                    {
                        wait = wait.max((*hint).min(MAX_RETRY_AFTER));
                    }
                    if e.is_retryable() {
                        warn!(target: "pool", creator = %creator.id, attempt, attempts, error = %e, "pool fetch attempt failed");
                    } else {
                        warn!(target: "pool", creator = %creator.id, attempt, attempts, error = %e, "malformed or rejected payload; attempt counted");
                    }

                    // no session: every further attempt would fail the same way
                    let give_up = e.is_fatal() || matches!(e, FeedError::Config(_));
                    last_error = e;
                    if give_up {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        warn!(target: "pool", creator = %creator.id, rate_limited, error = %last_error, "pool fetch abandoned");
        FetchOutcome::Abandoned {
            rate_limited,
            last_error,
        }
    }
}
