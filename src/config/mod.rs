// src/config/mod.rs
//! Engine tunables. Loaded from TOML or JSON; every field has a default so a
//! missing file still yields a working engine.

pub mod platform;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cleaner::CleanerConfig;
use crate::follow::FollowConfig;
use crate::pool::PoolConfig;
use crate::scheduler::SchedulerConfig;
use crate::selection::SelectionConfig;

pub use platform::{ConfigSource, EnvConfigSource, FileConfigSource, PlatformConfig, StaticConfig};

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/feed.toml";
pub const DEFAULT_JSON_PATH: &str = "config/feed.json";

fn default_platform() -> String {
    "bili".to_string()
}
fn default_display_count() -> usize {
    12
}
fn default_refresh_interval_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Short platform tag used in ids and cache keys.
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub user_id: String,
    /// Items offered to the renderer per selection.
    #[serde(default = "default_display_count")]
    pub display_count: usize,
    /// Period of the runner's automatic refresh.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub host: PlatformConfig,
    #[serde(default)]
    pub follow: FollowConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub cleaner: CleanerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            user_id: String::new(),
            display_count: default_display_count(),
            refresh_interval_secs: default_refresh_interval_secs(),
            host: PlatformConfig::default(),
            follow: FollowConfig::default(),
            pool: PoolConfig::default(),
            scheduler: SchedulerConfig::default(),
            selection: SelectionConfig::default(),
            cleaner: CleanerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Pools and the display history live as long as the retention window.
    pub fn pool_cache_ttl(&self) -> Duration {
        self.cleaner.retention()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

/// Load config from an explicit path. Supports TOML or JSON.
pub fn load_engine_config_from(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_engine_config(&content, ext.as_str())
}

/// Resolve the config path: `$FEED_CONFIG_PATH`, then `config/feed.toml`,
/// then `config/feed.json`. `None` means built-in defaults.
pub fn resolve_config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

pub fn load_engine_config_default() -> Result<EngineConfig> {
    match resolve_config_path()? {
        Some(p) => load_engine_config_from(&p),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_engine_config(s: &str, hint_ext: &str) -> Result<EngineConfig> {
    let cfg = if hint_ext == "json" {
        serde_json::from_str::<EngineConfig>(s).context("parsing feed config json")?
    } else {
        match toml::from_str::<EngineConfig>(s) {
            Ok(c) => c,
            // unknown extension: give JSON a chance before failing
            Err(toml_err) if hint_ext != "toml" => serde_json::from_str::<EngineConfig>(s)
                .map_err(|_| anyhow!("unsupported feed config format: {toml_err}"))?,
            Err(e) => return Err(e).context("parsing feed config toml"),
        }
    };
    Ok(sanitize(cfg))
}

/// Clamp tunables into ranges the algorithms can work with.
fn sanitize(mut cfg: EngineConfig) -> EngineConfig {
    cfg.display_count = cfg.display_count.max(1);
    cfg.host.concurrent_limit = cfg.host.concurrent_limit.max(1);
    cfg.follow.page_size = cfg.follow.page_size.max(1);
    cfg.pool.retry_attempts = cfg.pool.retry_attempts.max(1);
    cfg.scheduler.breaker_threshold = cfg.scheduler.breaker_threshold.max(1);

    let sel = &mut cfg.selection;
    if !(0.0..=1.0).contains(&sel.freshness_ratio) {
        sel.freshness_ratio = SelectionConfig::default().freshness_ratio;
    }
    if !(0.0..=1.0).contains(&sel.reset_display_ratio) {
        sel.reset_display_ratio = SelectionConfig::default().reset_display_ratio;
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = r#"
platform = "vid"
user_id = "1001"

[host]
request_delay_ms = 45000

[selection]
freshness_ratio = 0.25
"#;
        let c = parse_engine_config(s, "toml").unwrap();
        assert_eq!(c.platform, "vid");
        assert_eq!(c.user_id, "1001");
        assert_eq!(c.host.request_delay_ms, 45_000);
        assert!(c.host.strict);
        assert_eq!(c.selection.freshness_ratio, 0.25);
        assert_eq!(c.selection.reset_retain, 50);
        assert_eq!(c.follow.page_size, 50);
        assert_eq!(c.display_count, 12);
    }

    #[test]
    fn json_is_accepted() {
        let s = r#"{"user_id":"7","pool":{"pool_size":20}}"#;
        let c = parse_engine_config(s, "json").unwrap();
        assert_eq!(c.user_id, "7");
        assert_eq!(c.pool.pool_size, 20);
        assert_eq!(c.pool.retry_attempts, 3);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let s = r#"
display_count = 0
[selection]
freshness_ratio = 3.0
reset_display_ratio = -1.0
[pool]
retry_attempts = 0
"#;
        let c = parse_engine_config(s, "toml").unwrap();
        assert_eq!(c.display_count, 1);
        assert_eq!(c.selection.freshness_ratio, 0.5);
        assert_eq!(c.selection.reset_display_ratio, 0.8);
        assert_eq!(c.pool.retry_attempts, 1);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_engine_config("[[[", "toml").is_err());
        assert!(parse_engine_config("[[[", "").is_err());
    }
}
