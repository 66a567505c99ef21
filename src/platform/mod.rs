// src/platform/mod.rs
pub mod http;
pub mod text;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ContentItem, Creator};

pub use http::{HttpClientConfig, HttpPlatformClient};

/// Network side of the reference adapter.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Short tag used in ids and cache keys.
    fn platform(&self) -> &str;

    /// Login evidence check; must pass before any request is issued.
    async fn is_logged_in(&self) -> bool;

    /// One page (1-based) of the user's follow list.
    async fn fetch_follow_page(&self, user_id: &str, page: u32, page_size: usize)
        -> Result<Vec<Creator>>;

    /// Candidate pool for one creator, ordered by popularity upstream.
    async fn fetch_creator_items(&self, creator: &Creator, pool_size: usize)
        -> Result<Vec<ContentItem>>;
}
