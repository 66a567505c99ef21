// tests/scheduler.rs
mod support;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use follow_feed::cache::MemoryCacheStore;
use follow_feed::clock::ManualClock;
use follow_feed::config::PlatformConfig;
use follow_feed::model::{Creator, CreatorPool};
use follow_feed::pool::{ContentPoolFetcher, PoolConfig};
use follow_feed::scheduler::{
    NoopListener, RateLimitedScheduler, SchedulerConfig, SchedulerMode, UpdateListener, UpdateReport,
};
use follow_feed::FeedError;
use support::{creator, items_for, rate_limited, t0, Call, FakePlatform};

fn scheduler(fake: &Arc<FakePlatform>) -> RateLimitedScheduler {
    let clock = Arc::new(ManualClock::new(t0()));
    let fetcher = Arc::new(ContentPoolFetcher::new(
        fake.clone(),
        Arc::new(MemoryCacheStore::new()),
        clock.clone(),
        PoolConfig::default(),
        Duration::from_secs(30 * 24 * 3600),
    ));
    RateLimitedScheduler::new(fetcher, clock, SchedulerConfig::default())
}

fn sequential() -> PlatformConfig {
    PlatformConfig {
        request_delay_ms: 30_000,
        concurrent_requests: false,
        concurrent_limit: 1,
        strict: true,
    }
}

fn concurrent(limit: usize) -> PlatformConfig {
    PlatformConfig {
        request_delay_ms: 30_000,
        concurrent_requests: true,
        concurrent_limit: limit,
        strict: false,
    }
}

fn creators(n: u32, fake: &FakePlatform) -> Vec<Creator> {
    (1..=n)
        .map(|i| {
            let c = creator(i);
            fake.set_items(&c.id, items_for(&c, 3, 0));
            c
        })
        .collect()
}

fn always_rate_limited(fake: &FakePlatform, c: &Creator) {
    for _ in 0..3 {
        fake.push_response(&c.id, Err(rate_limited()));
    }
}

#[tokio::test(start_paused = true)]
async fn breaker_stops_sequential_queue_after_two_rate_limits() {
    let fake = FakePlatform::new();
    let list = creators(5, &fake);
    for c in &list {
        always_rate_limited(&fake, c);
    }

    let report = scheduler(&fake)
        .update_creators(&list, &sequential(), &NoopListener)
        .await;

    assert!(report.aborted_by_breaker);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.abandoned, 2);
    assert_eq!(report.skipped, 3);
    assert_eq!(fake.item_calls("fake:1"), 3);
    assert_eq!(fake.item_calls("fake:2"), 3);
    for id in ["fake:3", "fake:4", "fake:5"] {
        assert_eq!(fake.item_calls(id), 0, "{id} must never be requested");
    }
}

#[tokio::test(start_paused = true)]
async fn success_between_rate_limits_resets_breaker() {
    let fake = FakePlatform::new();
    let list = creators(4, &fake);
    always_rate_limited(&fake, &list[0]);
    always_rate_limited(&fake, &list[2]);

    let report = scheduler(&fake)
        .update_creators(&list, &sequential(), &NoopListener)
        .await;

    assert!(!report.aborted_by_breaker);
    assert_eq!(report.attempted, 4);
    assert_eq!(report.updated, 2);
    assert_eq!(report.rate_limited, 2);
}

#[tokio::test(start_paused = true)]
async fn sequential_runs_in_order_with_stretched_delay() {
    let fake = FakePlatform::new();
    let list = creators(3, &fake);

    let started = tokio::time::Instant::now();
    let report = scheduler(&fake)
        .update_creators(&list, &sequential(), &NoopListener)
        .await;

    assert_eq!(report.mode, SchedulerMode::Sequential);
    assert_eq!(report.updated, 3);
    let order: Vec<Call> = fake.calls();
    assert_eq!(
        order,
        ["fake:1", "fake:2", "fake:3"]
            .map(|c| Call::Items { creator: c.to_string() })
            .to_vec()
    );
    // 30s * 1.5 between each pair, none after the last
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(90));
    assert!(elapsed < Duration::from_secs(135));
}

#[tokio::test(start_paused = true)]
async fn concurrent_mode_batches_with_double_delay() {
    let fake = FakePlatform::new();
    let list = creators(5, &fake);

    let started = tokio::time::Instant::now();
    let report = scheduler(&fake)
        .update_creators(&list, &concurrent(2), &NoopListener)
        .await;

    assert_eq!(report.mode, SchedulerMode::Concurrent);
    assert_eq!(report.updated, 5);
    // three batches, two gaps of 60s
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(180));
}

#[tokio::test(start_paused = true)]
async fn failing_creator_does_not_cancel_batch_siblings() {
    let fake = FakePlatform::new();
    let list = creators(3, &fake);
    for _ in 0..3 {
        fake.push_response("fake:2", Err(FeedError::TransientNetwork("reset".into())));
    }

    let report = scheduler(&fake)
        .update_creators(&list, &concurrent(3), &NoopListener)
        .await;

    assert_eq!(report.updated, 2);
    assert_eq!(report.abandoned, 1);
    assert!(!report.aborted_by_breaker);
}

#[tokio::test(start_paused = true)]
async fn strict_platform_is_clamped_to_sequential() {
    let fake = FakePlatform::new();
    let list = creators(2, &fake);
    let host = PlatformConfig {
        strict: true,
        ..concurrent(4)
    };

    let report = scheduler(&fake).update_creators(&list, &host, &NoopListener).await;
    assert_eq!(report.mode, SchedulerMode::Sequential);
    assert_eq!(report.updated, 2);
}

#[derive(Default)]
struct Recorder {
    updated: Mutex<Vec<(String, usize)>>,
    completed: Mutex<Vec<UpdateReport>>,
}

#[async_trait]
impl UpdateListener for Recorder {
    async fn on_creator_updated(&self, creator: &Creator, pool: &CreatorPool) {
        self.updated.lock().push((creator.id.clone(), pool.len()));
    }

    async fn on_run_complete(&self, report: &UpdateReport) {
        self.completed.lock().push(report.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn listener_sees_each_merge_and_the_run_end() {
    let fake = FakePlatform::new();
    let list = creators(2, &fake);
    always_rate_limited(&fake, &list[1]);
    let rec = Recorder::default();

    let report = scheduler(&fake).update_creators(&list, &sequential(), &rec).await;

    assert_eq!(*rec.updated.lock(), vec![("fake:1".to_string(), 3)]);
    assert_eq!(*rec.completed.lock(), vec![report]);
}

#[tokio::test(start_paused = true)]
async fn empty_queue_is_a_noop() {
    let fake = FakePlatform::new();
    let report = scheduler(&fake).update_creators(&[], &sequential(), &NoopListener).await;
    assert_eq!(report.attempted, 0);
    assert!(fake.calls().is_empty());
}
