//! Core records: creators, content items and per-creator pools.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Platform-scoped identity: `{platform}:{native id}`.
pub fn scoped_id(platform: &str, native_id: &str) -> String {
    format!("{platform}:{native_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Creator {
    pub id: String,
    pub platform_id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Video,
    Short,
    Live,
    Post,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContentMetrics {
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub comments: Option<u64>,
}

/// A fetched item. Never mutated in place; a re-fetch supersedes it on merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: ContentMetrics,
    pub duration_seconds: u32,
    #[serde(rename = "type", default)]
    pub kind: ContentType,
}

/// Cached pool for one creator, newest first, unique by item id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatorPool {
    pub creator_id: String,
    pub items: Vec<ContentItem>,
    /// Last successful network refresh; `None` for a pool never fetched.
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CreatorPool {
    pub fn empty(creator_id: impl Into<String>) -> Self {
        Self {
            creator_id: creator_id.into(),
            items: Vec::new(),
            fetched_at: None,
        }
    }

    /// Build a pool from arbitrary items, enforcing the sort/dedup invariant.
    pub fn from_items(creator_id: impl Into<String>, items: Vec<ContentItem>) -> Self {
        Self {
            creator_id: creator_id.into(),
            items: crate::pool::merge_incremental(&[], items),
            fetched_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.fetched_at.is_some_and(|t| now - t < max_age)
    }
}
