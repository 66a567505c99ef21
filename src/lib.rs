// src/lib.rs
// Public library surface for the runner and integration tests.

pub mod cache;
pub mod cleaner;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod follow;
pub mod model;
pub mod platform;
pub mod pool;
pub mod render;
pub mod scheduler;
pub mod selection;
pub mod tasks;
pub mod telemetry;

// ---- Re-exports for a stable public API ----
pub use crate::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{
    ConfigSource, EngineConfig, EnvConfigSource, FileConfigSource, PlatformConfig, StaticConfig,
};
pub use crate::engine::{CleanupReport, EngineDeps, FeedEngine, RefreshReport};
pub use crate::error::{FeedError, Result};
pub use crate::model::{ContentItem, ContentMetrics, ContentType, Creator, CreatorPool};
pub use crate::platform::{HttpClientConfig, HttpPlatformClient, PlatformClient};
pub use crate::render::{manual_refresh_channel, LoggingRenderer, ManualRefresh, Renderer};
pub use crate::tasks::TaskHandle;
