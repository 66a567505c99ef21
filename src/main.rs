//! Headless feed runner.
//! Wires the engine to the HTTP platform client, the file-backed cache store
//! and a logging renderer, then keeps refreshing until Ctrl-C.
//!
//! On stdin, `r` raises a manual refresh and `s` re-shuffles the selection.

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use follow_feed::config::{load_engine_config_default, resolve_config_path};
use follow_feed::{
    manual_refresh_channel, ConfigSource, EngineDeps, EnvConfigSource, FeedEngine, FeedError,
    FileCacheStore, FileConfigSource, HttpClientConfig, HttpPlatformClient, LoggingRenderer,
    SystemClock,
};

const ENV_USER_ID: &str = "FEED_USER_ID";
const ENV_CACHE_DIR: &str = "FEED_CACHE_DIR";
const ENV_LOG_JSON: &str = "FEED_LOG_JSON";
const DEFAULT_CACHE_DIR: &str = ".feed-cache";

/// `RUST_LOG` wins; otherwise `follow_feed=info,warn`. `FEED_LOG_JSON=1`
/// switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("follow_feed=info,warn"));
    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut cfg = load_engine_config_default().context("loading feed config")?;
    if let Some(uid) = std::env::var(ENV_USER_ID)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        cfg.user_id = uid;
    }
    if cfg.user_id.is_empty() {
        bail!("no user id configured: set `user_id` in the config file or {ENV_USER_ID}");
    }

    // host limits and env overrides are re-read on every cycle
    let config_source: Arc<dyn ConfigSource> = match resolve_config_path()? {
        Some(path) => Arc::new(FileConfigSource::new(path)),
        None => Arc::new(EnvConfigSource::new(cfg.host.clone())),
    };

    let cache_dir = std::env::var(ENV_CACHE_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));
    let cache = FileCacheStore::open(&cache_dir).with_context(|| format!("opening cache dir {}", cache_dir.display()))?;

    let client = HttpPlatformClient::new(cfg.platform.clone(), HttpClientConfig::default().with_env_session())
        .context("building platform client")?;

    let refresh_every = cfg.refresh_interval();
    let cleanup_every = cfg.cleaner.interval();
    let engine = Arc::new(FeedEngine::new(
        cfg,
        EngineDeps {
            client: Arc::new(client),
            cache: Arc::new(cache),
            clock: Arc::new(SystemClock),
            renderer: Arc::new(LoggingRenderer),
            config_source,
        },
    ));

    match engine.refresh().await {
        Ok(r) => info!(creators = r.creators, queued = r.queued, displayed = r.displayed, "initial refresh"),
        Err(FeedError::NotAuthenticated) => {
            bail!("not logged in: set FEED_SESSION_COOKIE to a valid session cookie")
        }
        Err(FeedError::NoFollowedCreators) => warn!("the account follows nobody; nothing to show yet"),
        Err(e) => return Err(e).context("initial refresh"),
    }

    let (button, rx) = manual_refresh_channel();
    let tasks = vec![
        engine.spawn_periodic_refresh(refresh_every),
        engine.spawn_cleanup_task(cleanup_every),
        engine.spawn_manual_refresh_listener(rx),
    ];

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(l)) if l.trim().eq_ignore_ascii_case("r") => {
                    if !button.request() {
                        break;
                    }
                }
                Ok(Some(l)) if l.trim().eq_ignore_ascii_case("s") => {
                    engine.shuffle().await;
                }
                Ok(Some(_)) => {}
                // stdin closed: keep running on timers only
                Ok(None) | Err(_) => {
                    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
                    break;
                }
            },
        }
    }

    info!("shutting down");
    for t in tasks {
        t.shutdown().await;
    }
    Ok(())
}
