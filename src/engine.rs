// src/engine.rs
//! # Feed engine
//! Owns every component and the shared in-memory state (creator pools,
//! selection history, on-screen ids). One refresh cycle:
//!
//! 1. re-read the host's platform limits,
//! 2. resolve the follow list (cache first),
//! 3. split creators into fresh pools and pools needing the network,
//! 4. select and render from what is cached right away,
//! 5. refresh the stale pools in the background and render again when done.
//!
//! Cycles never overlap: a refresh requested while one (including its
//! background part) is still running is skipped.

use async_trait::async_trait;
use metrics::gauge;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::{self, keys, CacheStore};
use crate::cleaner::StalenessCleaner;
use crate::clock::Clock;
use crate::config::{ConfigSource, EngineConfig, PlatformConfig};
use crate::error::Result;
use crate::follow::FollowGraphFetcher;
use crate::model::{ContentItem, Creator, CreatorPool};
use crate::platform::PlatformClient;
use crate::pool::ContentPoolFetcher;
use crate::render::Renderer;
use crate::scheduler::{RateLimitedScheduler, UpdateListener, UpdateReport};
use crate::selection::{DisplayHistory, SelectionEngine};
use crate::tasks::TaskHandle;
use crate::telemetry::{anon_hash, ensure_metrics_described, REFRESH_LAST_RUN_TS};

/// Collaborators injected at construction.
pub struct EngineDeps {
    pub client: Arc<dyn PlatformClient>,
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub renderer: Arc<dyn Renderer>,
    pub config_source: Arc<dyn ConfigSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Another cycle was still running; nothing was done.
    pub skipped: bool,
    pub creators: usize,
    /// Creators served from a fresh cached pool.
    pub fresh: usize,
    /// Creators handed to the background scheduler.
    pub queued: usize,
    /// Items offered to the renderer by the immediate selection.
    pub displayed: usize,
    /// The follow list could not be fetched; the last known list was used.
    pub degraded: bool,
}

impl RefreshReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub skipped: bool,
    pub pools_pruned: usize,
    pub items_removed: usize,
}

struct EngineState {
    creators: Vec<Creator>,
    pools: HashMap<String, CreatorPool>,
    selection: SelectionEngine,
    /// Ids currently painted by the renderer.
    on_screen: HashSet<String>,
}

impl EngineState {
    /// Pools of the current follow list, in follow-list order.
    fn ordered_pools(&self) -> Vec<CreatorPool> {
        self.creators
            .iter()
            .filter_map(|c| self.pools.get(&c.id).cloned())
            .collect()
    }
}

/// Clears the running flag when the cycle (or its background part) ends.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedEngine {
    cfg: EngineConfig,
    config_source: Arc<dyn ConfigSource>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn Renderer>,
    follow: FollowGraphFetcher,
    fetcher: Arc<ContentPoolFetcher>,
    scheduler: RateLimitedScheduler,
    cleaner: StalenessCleaner,
    state: Mutex<EngineState>,
    running: Arc<AtomicBool>,
    history_restored: AtomicBool,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl FeedEngine {
    pub fn new(cfg: EngineConfig, deps: EngineDeps) -> Self {
        ensure_metrics_described();
        let EngineDeps {
            client,
            cache,
            clock,
            renderer,
            config_source,
        } = deps;

        let follow = FollowGraphFetcher::new(Arc::clone(&client), Arc::clone(&cache), cfg.follow.clone());
        let fetcher = Arc::new(ContentPoolFetcher::new(
            client,
            Arc::clone(&cache),
            Arc::clone(&clock),
            cfg.pool.clone(),
            cfg.pool_cache_ttl(),
        ));
        let scheduler =
            RateLimitedScheduler::new(Arc::clone(&fetcher), Arc::clone(&clock), cfg.scheduler.clone());
        let cleaner = StalenessCleaner::new(cfg.cleaner.clone(), Arc::clone(&clock));
        let state = EngineState {
            creators: Vec::new(),
            pools: HashMap::new(),
            selection: SelectionEngine::new(cfg.selection.clone()),
            on_screen: HashSet::new(),
        };

        Self {
            cfg,
            config_source,
            cache,
            clock,
            renderer,
            follow,
            fetcher,
            scheduler,
            cleaner,
            state: Mutex::new(state),
            running: Arc::new(AtomicBool::new(false)),
            history_restored: AtomicBool::new(false),
            background: Mutex::new(None),
        }
    }

    /// Deterministic random fill for the selection.
    pub fn with_selection_seed(self, seed: u64) -> Self {
        self.state.lock().selection = SelectionEngine::with_seed(self.cfg.selection.clone(), seed);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn on_screen(&self) -> HashSet<String> {
        self.state.lock().on_screen.clone()
    }

    pub fn pool(&self, creator_id: &str) -> Option<CreatorPool> {
        self.state.lock().pools.get(creator_id).cloned()
    }

    pub fn history(&self) -> DisplayHistory {
        self.state.lock().selection.history().clone()
    }

    /// One refresh cycle. Only `NotAuthenticated` and `NoFollowedCreators`
    /// surface as errors; everything else degrades to cached data.
    pub async fn refresh(self: &Arc<Self>) -> Result<RefreshReport> {
        let Some(guard) = RunGuard::acquire(&self.running) else {
            info!(target: "engine", "refresh already in progress; skipped");
            return Ok(RefreshReport::skipped());
        };

        let platform = self.config_source.platform_config();
        let now = self.clock.now();
        gauge!(REFRESH_LAST_RUN_TS).set(now.timestamp() as f64);
        info!(
            target: "engine",
            user = %anon_hash(&self.cfg.user_id),
            delay_ms = platform.request_delay_ms,
            concurrent = platform.concurrent_requests,
            "refresh cycle start"
        );
        self.restore_history_once().await;

        let mut report = RefreshReport::default();
        let creators = match self
            .follow
            .fetch_followed_creators(&self.cfg.user_id, platform.request_delay())
            .await
        {
            Ok(list) => {
                self.set_creators(list.clone());
                list
            }
            Err(e) if e.is_fatal() => {
                warn!(target: "engine", error = %e, "refresh aborted");
                return Err(e);
            }
            Err(e) => {
                warn!(target: "engine", error = %e, "follow list unavailable; using last known list");
                report.degraded = true;
                self.known_creators()
            }
        };
        report.creators = creators.len();

        let freshness = self.fetcher.config().freshness();
        let mut loaded = Vec::with_capacity(creators.len());
        let mut stale = Vec::new();
        for c in &creators {
            let pool = match self.pool(&c.id) {
                Some(p) => Some(p),
                None => self.fetcher.load_pool(&c.id).await,
            };
            match pool {
                Some(p) if p.is_fresh(now, freshness) => {
                    report.fresh += 1;
                    loaded.push(p);
                }
                Some(p) => {
                    loaded.push(p);
                    stale.push(c.clone());
                }
                None => stale.push(c.clone()),
            }
        }

        let shown = self.install_and_select(loaded);
        report.displayed = shown.len();
        self.persist_history().await;
        self.renderer.render(&shown).await;

        report.queued = stale.len();
        info!(
            target: "engine",
            creators = report.creators,
            fresh = report.fresh,
            queued = report.queued,
            displayed = report.displayed,
            degraded = report.degraded,
            "refresh cycle served from cache"
        );

        if !stale.is_empty() {
            let engine = Arc::clone(self);
            let handle = tokio::spawn(async move {
                let _guard = guard;
                engine.run_background(stale, platform).await;
            });
            *self.background.lock() = Some(handle);
        }
        Ok(report)
    }

    /// Re-select from the in-memory snapshot without fetching ("shuffle again").
    pub async fn shuffle(&self) -> Vec<ContentItem> {
        let shown = {
            let mut st = self.state.lock();
            let picked = st.selection.select(self.cfg.display_count);
            st.on_screen = picked.iter().map(|it| it.id.clone()).collect();
            picked
        };
        self.persist_history().await;
        self.renderer.render(&shown).await;
        shown
    }

    /// Evict stale items from every in-memory pool. Skipped while a refresh
    /// cycle is running so background merges are never overwritten.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!(target: "cleaner", "refresh in progress; cleanup deferred");
            return CleanupReport {
                skipped: true,
                ..Default::default()
            };
        };

        let (pools, pinned) = {
            let st = self.state.lock();
            (st.pools.values().cloned().collect::<Vec<_>>(), st.on_screen.clone())
        };

        let mut report = CleanupReport::default();
        let mut pruned = Vec::new();
        for pool in pools {
            let (pool, removed) = self.cleaner.evict_pool(pool, &pinned);
            if removed == 0 {
                continue;
            }
            if let Err(e) = self.fetcher.store_pool(&pool).await {
                warn!(target: "cleaner", creator = %pool.creator_id, error = %e, "pruned pool not persisted");
            }
            report.pools_pruned += 1;
            report.items_removed += removed;
            pruned.push(pool);
        }

        if !pruned.is_empty() {
            let mut st = self.state.lock();
            for pool in pruned {
                st.pools.insert(pool.creator_id.clone(), pool);
            }
            let pools = st.ordered_pools();
            st.selection.collect(&pools);
        }

        info!(
            target: "cleaner",
            pools_pruned = report.pools_pruned,
            items_removed = report.items_removed,
            retention_days = self.cleaner.config().retention_days,
            "cleanup pass"
        );
        report
    }

    /// Wait for the background part of the last refresh, if any.
    pub async fn wait_for_background(&self) {
        let handle = self.background.lock().take();
        if let Some(h) = handle {
            if let Err(e) = h.await {
                if !e.is_cancelled() {
                    error!(target: "engine", error = %e, "background update panicked");
                }
            }
        }
    }

    pub fn spawn_periodic_refresh(self: &Arc<Self>, every: Duration) -> TaskHandle {
        let engine = Arc::clone(self);
        TaskHandle::new(
            "periodic-refresh",
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(e) = engine.refresh().await {
                        warn!(target: "engine", error = %e, "periodic refresh failed");
                    }
                }
            }),
        )
    }

    pub fn spawn_cleanup_task(self: &Arc<Self>, every: Duration) -> TaskHandle {
        let engine = Arc::clone(self);
        TaskHandle::new(
            "cleanup",
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    engine.run_cleanup().await;
                }
            }),
        )
    }

    /// Run a refresh for every manual refresh request until the sender side
    /// is dropped.
    pub fn spawn_manual_refresh_listener(self: &Arc<Self>, mut rx: mpsc::Receiver<()>) -> TaskHandle {
        let engine = Arc::clone(self);
        TaskHandle::new(
            "manual-refresh",
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    debug!(target: "engine", "manual refresh requested");
                    match engine.refresh().await {
                        Ok(r) if r.skipped => debug!(target: "engine", "manual refresh coalesced"),
                        Ok(_) => {}
                        Err(e) => warn!(target: "engine", error = %e, "manual refresh failed"),
                    }
                }
            }),
        )
    }

    async fn run_background(&self, stale: Vec<Creator>, platform: PlatformConfig) {
        let report = self.scheduler.update_creators(&stale, &platform, self).await;
        if report.updated == 0 {
            return;
        }
        let shown = {
            let mut st = self.state.lock();
            let pools = st.ordered_pools();
            let picked = st.selection.select_for_display(&pools, self.cfg.display_count);
            st.on_screen = picked.iter().map(|it| it.id.clone()).collect();
            picked
        };
        self.persist_history().await;
        self.renderer.render(&shown).await;
        info!(target: "engine", displayed = shown.len(), "re-rendered after background update");
    }

    fn set_creators(&self, creators: Vec<Creator>) {
        self.state.lock().creators = creators;
    }

    fn known_creators(&self) -> Vec<Creator> {
        self.state.lock().creators.clone()
    }

    fn install_and_select(&self, loaded: Vec<CreatorPool>) -> Vec<ContentItem> {
        let mut st = self.state.lock();
        let current: HashSet<String> = st.creators.iter().map(|c| c.id.clone()).collect();
        // unfollowed creators drop out of the in-memory map
        st.pools.retain(|id, _| current.contains(id));
        for pool in loaded {
            st.pools.insert(pool.creator_id.clone(), pool);
        }
        let pools = st.ordered_pools();
        let picked = st.selection.select_for_display(&pools, self.cfg.display_count);
        st.on_screen = picked.iter().map(|it| it.id.clone()).collect();
        picked
    }

    async fn restore_history_once(&self) {
        if self.history_restored.swap(true, Ordering::AcqRel) {
            return;
        }
        let key = keys::display_history(&self.cfg.platform);
        match cache::get_json::<DisplayHistory>(self.cache.as_ref(), &key).await {
            Ok(Some(h)) => {
                debug!(target: "engine", entries = h.len(), "display history restored");
                self.state.lock().selection.set_history(h);
            }
            Ok(None) => {}
            Err(e) => warn!(target: "engine", error = %e, "display history not restored"),
        }
    }

    async fn persist_history(&self) {
        let snapshot = self.history();
        let key = keys::display_history(&self.cfg.platform);
        if let Err(e) = cache::set_json(self.cache.as_ref(), &key, &snapshot, self.cfg.pool_cache_ttl()).await {
            warn!(target: "engine", error = %e, "display history not persisted");
        }
    }
}

#[async_trait]
impl UpdateListener for FeedEngine {
    async fn on_creator_updated(&self, creator: &Creator, pool: &CreatorPool) {
        self.state.lock().pools.insert(creator.id.clone(), pool.clone());
    }

    async fn on_run_complete(&self, report: &UpdateReport) {
        debug!(
            target: "engine",
            updated = report.updated,
            abandoned = report.abandoned,
            aborted = report.aborted_by_breaker,
            "background update finished"
        );
    }
}
