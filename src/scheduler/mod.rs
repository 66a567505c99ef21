// src/scheduler/mod.rs
//! Rate-limit-aware orchestration of per-creator pool refreshes.
//!
//! Sequential mode is the safe default: one creator at a time with a
//! stretched delay between them and a circuit breaker that stops the queue
//! once the upstream keeps throttling. Concurrent mode runs fixed-size
//! batches and is only honoured on platforms not marked strict.

pub mod breaker;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::model::{Creator, CreatorPool};
use crate::pool::{ContentPoolFetcher, FetchOutcome};
use crate::telemetry::BREAKER_TRIPPED_TOTAL;

pub use breaker::{SchedulerMode, SchedulerState};

fn default_sequential_floor_ms() -> u64 {
    5_000
}
fn default_breaker_threshold() -> u32 {
    2
}
fn default_breaker_cooldown_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Lower bound for the pause between two sequential creator fetches.
    #[serde(default = "default_sequential_floor_ms")]
    pub sequential_floor_ms: u64,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sequential_floor_ms: default_sequential_floor_ms(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn sequential_floor(&self) -> Duration {
        Duration::from_millis(self.sequential_floor_ms)
    }

    pub fn breaker_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.breaker_cooldown_secs).unwrap_or(i64::MAX))
    }
}

/// Mode and batch width actually used for a run. Concurrency on a strict
/// platform is silently clamped to sequential with a limit of one.
pub fn effective_mode(platform: &PlatformConfig) -> (SchedulerMode, usize) {
    if !platform.concurrent_requests {
        return (SchedulerMode::Sequential, 1);
    }
    let limit = platform.concurrent_limit.max(1);
    if platform.strict && limit > 1 {
        debug!(target: "scheduler", limit, "strict platform: clamping concurrency to sequential");
        return (SchedulerMode::Sequential, 1);
    }
    (SchedulerMode::Concurrent, limit)
}

/// Pause between two sequential fetches: `max(request_delay * 1.5, floor)`.
pub fn sequential_delay(request_delay: Duration, floor: Duration) -> Duration {
    request_delay.mul_f64(1.5).max(floor)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub attempted: usize,
    pub updated: usize,
    pub abandoned: usize,
    /// Creators that saw at least one rate-limit response.
    pub rate_limited: usize,
    pub aborted_by_breaker: bool,
    /// Creators left in the queue when the breaker tripped.
    pub skipped: usize,
    pub mode: SchedulerMode,
}

/// Observer for a scheduler run. Both hooks default to no-ops.
#[async_trait]
pub trait UpdateListener: Send + Sync {
    async fn on_creator_updated(&self, _creator: &Creator, _pool: &CreatorPool) {}

    async fn on_run_complete(&self, _report: &UpdateReport) {}
}

pub struct NoopListener;

#[async_trait]
impl UpdateListener for NoopListener {}

pub struct RateLimitedScheduler {
    fetcher: Arc<ContentPoolFetcher>,
    clock: Arc<dyn Clock>,
    cfg: SchedulerConfig,
}

impl RateLimitedScheduler {
    pub fn new(fetcher: Arc<ContentPoolFetcher>, clock: Arc<dyn Clock>, cfg: SchedulerConfig) -> Self {
        Self {
            fetcher,
            clock,
            cfg,
        }
    }

    /// Refresh every creator's pool under the platform's limits. Never
    /// fails: per-creator failures only show up in the report.
    pub async fn update_creators(
        &self,
        creators: &[Creator],
        platform: &PlatformConfig,
        listener: &dyn UpdateListener,
    ) -> UpdateReport {
        let (mode, limit) = effective_mode(platform);
        let mut state = SchedulerState::new(mode);
        let mut report = UpdateReport {
            mode,
            ..Default::default()
        };

        info!(
            target: "scheduler",
            creators = creators.len(),
            ?mode,
            limit,
            delay_ms = platform.request_delay_ms,
            "update run start"
        );

        match mode {
            SchedulerMode::Sequential => {
                self.run_sequential(creators, platform, &mut state, &mut report, listener)
                    .await
            }
            SchedulerMode::Concurrent => {
                self.run_concurrent(creators, platform, limit, &mut state, &mut report, listener)
                    .await
            }
        }

        info!(
            target: "scheduler",
            attempted = report.attempted,
            updated = report.updated,
            abandoned = report.abandoned,
            rate_limited = report.rate_limited,
            aborted = report.aborted_by_breaker,
            skipped = report.skipped,
            "update run end"
        );
        listener.on_run_complete(&report).await;
        report
    }

    async fn run_sequential(
        &self,
        creators: &[Creator],
        platform: &PlatformConfig,
        state: &mut SchedulerState,
        report: &mut UpdateReport,
        listener: &dyn UpdateListener,
    ) {
        let pause = sequential_delay(platform.request_delay(), self.cfg.sequential_floor());
        for (idx, creator) in creators.iter().enumerate() {
            let outcome = self.fetcher.refresh_creator(creator).await;
            self.absorb(creator, outcome, state, report, listener).await;

            let remaining = creators.len() - idx - 1;
            if self.check_breaker(state, report, remaining) {
                return;
            }
            if remaining > 0 {
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn run_concurrent(
        &self,
        creators: &[Creator],
        platform: &PlatformConfig,
        limit: usize,
        state: &mut SchedulerState,
        report: &mut UpdateReport,
        listener: &dyn UpdateListener,
    ) {
        let pause = platform.request_delay() * 2;
        let batches: Vec<&[Creator]> = creators.chunks(limit).collect();
        let mut done = 0usize;
        for (idx, batch) in batches.iter().enumerate() {
            // a failing creator never cancels its siblings
            let outcomes = join_all(batch.iter().map(|c| self.fetcher.refresh_creator(c))).await;
            for (creator, outcome) in batch.iter().zip(outcomes) {
                self.absorb(creator, outcome, state, report, listener).await;
            }
            done += batch.len();

            if self.check_breaker(state, report, creators.len() - done) {
                return;
            }
            if idx + 1 < batches.len() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn absorb(
        &self,
        creator: &Creator,
        outcome: FetchOutcome,
        state: &mut SchedulerState,
        report: &mut UpdateReport,
        listener: &dyn UpdateListener,
    ) {
        report.attempted += 1;
        match outcome {
            FetchOutcome::Updated {
                pool, rate_limited, ..
            } => {
                report.updated += 1;
                if rate_limited {
                    report.rate_limited += 1;
                }
                state.record_success();
                listener.on_creator_updated(creator, &pool).await;
            }
            FetchOutcome::Abandoned { rate_limited, .. } => {
                report.abandoned += 1;
                if rate_limited {
                    report.rate_limited += 1;
                    let hits = state.record_rate_limit(self.clock.now(), self.cfg.breaker_cooldown());
                    debug!(target: "scheduler", creator = %creator.id, hits, "rate-limit signal recorded");
                }
            }
        }
    }

    /// True when the run must stop. `remaining` creators are reported skipped.
    fn check_breaker(&self, state: &SchedulerState, report: &mut UpdateReport, remaining: usize) -> bool {
        if !state.is_tripped(self.cfg.breaker_threshold) {
            return false;
        }
        if remaining > 0 {
            report.aborted_by_breaker = true;
            report.skipped = remaining;
            counter!(BREAKER_TRIPPED_TOTAL).increment(1);
            warn!(
                target: "scheduler",
                hits = state.consecutive_rate_limit_hits,
                skipped = remaining,
                "circuit breaker tripped; abandoning remaining queue"
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(concurrent: bool, limit: usize, strict: bool) -> PlatformConfig {
        PlatformConfig {
            request_delay_ms: 1_000,
            concurrent_requests: concurrent,
            concurrent_limit: limit,
            strict,
        }
    }

    #[test]
    fn strict_platform_clamps_concurrency() {
        assert_eq!(effective_mode(&host(true, 4, true)), (SchedulerMode::Sequential, 1));
        assert_eq!(effective_mode(&host(true, 4, false)), (SchedulerMode::Concurrent, 4));
        assert_eq!(effective_mode(&host(false, 4, false)), (SchedulerMode::Sequential, 1));
        assert_eq!(effective_mode(&host(true, 0, false)), (SchedulerMode::Concurrent, 1));
    }

    #[test]
    fn sequential_delay_respects_floor() {
        let floor = Duration::from_secs(5);
        assert_eq!(sequential_delay(Duration::from_secs(30), floor), Duration::from_secs(45));
        assert_eq!(sequential_delay(Duration::from_secs(2), floor), floor);
    }

    #[test]
    fn config_defaults() {
        let c = SchedulerConfig::default();
        assert_eq!(c.breaker_threshold, 2);
        assert_eq!(c.breaker_cooldown(), chrono::Duration::minutes(10));
        assert_eq!(c.sequential_floor(), Duration::from_secs(5));
    }
}
