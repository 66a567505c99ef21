// src/config/platform.rs
//! Host-supplied per-platform limits, re-read before every refresh cycle.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_REQUEST_DELAY_SECS: &str = "FEED_REQUEST_DELAY_SECS";
pub const ENV_CONCURRENT: &str = "FEED_CONCURRENT";
pub const ENV_CONCURRENT_LIMIT: &str = "FEED_CONCURRENT_LIMIT";

fn default_request_delay_ms() -> u64 {
    // the platform bans aggressively; assume tens of seconds between calls
    30_000
}
fn default_concurrent_limit() -> usize {
    1
}
fn default_strict() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformConfig {
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default)]
    pub concurrent_requests: bool,
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
    /// Known-strict platforms never run concurrent fetches.
    #[serde(default = "default_strict")]
    pub strict: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            concurrent_requests: false,
            concurrent_limit: default_concurrent_limit(),
            strict: default_strict(),
        }
    }
}

impl PlatformConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Apply `FEED_*` environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = std::env::var(ENV_REQUEST_DELAY_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
        {
            self.request_delay_ms = (secs * 1_000.0) as u64;
        }
        if let Ok(v) = std::env::var(ENV_CONCURRENT) {
            self.concurrent_requests = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(n) = std::env::var(ENV_CONCURRENT_LIMIT)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            self.concurrent_limit = n.max(1);
        }
        self
    }
}

/// The configuration host as seen from the engine.
pub trait ConfigSource: Send + Sync {
    fn platform_config(&self) -> PlatformConfig;
}

/// Fixed configuration the host may swap at runtime.
#[derive(Debug, Default)]
pub struct StaticConfig {
    inner: RwLock<PlatformConfig>,
}

impl StaticConfig {
    pub fn new(cfg: PlatformConfig) -> Self {
        Self {
            inner: RwLock::new(cfg),
        }
    }

    pub fn set(&self, cfg: PlatformConfig) {
        *self.inner.write() = cfg;
    }
}

impl ConfigSource for StaticConfig {
    fn platform_config(&self) -> PlatformConfig {
        self.inner.read().clone()
    }
}

/// Built-in limits with the `FEED_*` overrides applied fresh on every call.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigSource {
    base: PlatformConfig,
}

impl EnvConfigSource {
    pub fn new(base: PlatformConfig) -> Self {
        Self { base }
    }
}

impl ConfigSource for EnvConfigSource {
    fn platform_config(&self) -> PlatformConfig {
        self.base.clone().with_env_overrides()
    }
}

/// Reads the `[host]` table of the feed config file on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn platform_config(&self) -> PlatformConfig {
        let cfg = match super::load_engine_config_from(&self.path) {
            Ok(c) => c.host,
            Err(e) => {
                tracing::warn!(
                    target: "engine",
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "host config unreadable; using defaults"
                );
                PlatformConfig::default()
            }
        };
        cfg.with_env_overrides()
    }
}
