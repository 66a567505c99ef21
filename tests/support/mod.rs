// tests/support/mod.rs
// Shared fixtures: a scripted platform that records every call, a recording
// renderer and record builders.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use follow_feed::model::{ContentItem, ContentMetrics, ContentType, Creator};
use follow_feed::{FeedError, PlatformClient, Renderer, Result};

pub const PLATFORM: &str = "fake";

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn creator(n: u32) -> Creator {
    Creator {
        id: format!("{PLATFORM}:{n}"),
        platform_id: n.to_string(),
        username: format!("creator{n}"),
        display_name: format!("Creator {n}"),
        avatar: None,
        verified: None,
    }
}

/// Item `n` of `creator_id`, published `age_mins` minutes before [`t0`].
pub fn item(creator_id: &str, n: u32, age_mins: i64) -> ContentItem {
    ContentItem {
        id: format!("{creator_id}/{n}"),
        creator_id: creator_id.to_string(),
        title: format!("item {n}"),
        description: None,
        thumbnail: None,
        url: format!("https://example.invalid/{creator_id}/{n}"),
        published_at: t0() - chrono::Duration::minutes(age_mins),
        metrics: ContentMetrics::default(),
        duration_seconds: 300,
        kind: ContentType::Video,
    }
}

/// `count` items for creator `c`, one hour apart, the newest `offset_hours` old.
pub fn items_for(c: &Creator, count: u32, offset_hours: i64) -> Vec<ContentItem> {
    (0..count)
        .map(|n| item(&c.id, n, (offset_hours + n as i64) * 60))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Follow { page: u32 },
    Items { creator: String },
}

/// Scripted platform. Follow pages come from `follow_pages`; item fetches pop
/// from a per-creator script and fall back to the creator's default items.
pub struct FakePlatform {
    logged_in: AtomicBool,
    follow_pages: Mutex<HashMap<u32, Result<Vec<Creator>>>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<Vec<ContentItem>>>>>,
    defaults: Mutex<HashMap<String, Vec<ContentItem>>>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            logged_in: AtomicBool::new(true),
            follow_pages: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_logged_in(&self, v: bool) {
        self.logged_in.store(v, Ordering::SeqCst);
    }

    pub fn set_follow_page(&self, page: u32, res: Result<Vec<Creator>>) {
        self.follow_pages.lock().insert(page, res);
    }

    /// Split `creators` into pages of `page_size`.
    pub fn set_follow_list(&self, creators: &[Creator], page_size: usize) {
        let mut pages = self.follow_pages.lock();
        pages.clear();
        for (i, chunk) in creators.chunks(page_size).enumerate() {
            pages.insert(i as u32 + 1, Ok(chunk.to_vec()));
        }
    }

    pub fn set_items(&self, creator_id: &str, items: Vec<ContentItem>) {
        self.defaults.lock().insert(creator_id.to_string(), items);
    }

    pub fn push_response(&self, creator_id: &str, res: Result<Vec<ContentItem>>) {
        self.scripts
            .lock()
            .entry(creator_id.to_string())
            .or_default()
            .push_back(res);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn item_calls(&self, creator_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Items { creator } if creator == creator_id))
            .count()
    }

    pub fn follow_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Follow { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn fetch_follow_page(&self, _user_id: &str, page: u32, _page_size: usize) -> Result<Vec<Creator>> {
        self.calls.lock().push(Call::Follow { page });
        self.follow_pages
            .lock()
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_creator_items(&self, creator: &Creator, _pool_size: usize) -> Result<Vec<ContentItem>> {
        self.calls.lock().push(Call::Items {
            creator: creator.id.clone(),
        });
        let scripted = self
            .scripts
            .lock()
            .get_mut(&creator.id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(res) => res,
            None => Ok(self.defaults.lock().get(&creator.id).cloned().unwrap_or_default()),
        }
    }
}

pub fn rate_limited() -> FeedError {
    FeedError::RateLimited { retry_after: None }
}

/// Keeps every batch handed to it, as item ids.
#[derive(Default)]
pub struct RecordingRenderer {
    frames: Mutex<Vec<Vec<String>>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<Vec<String>> {
        self.frames.lock().clone()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.frames.lock().last().cloned()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, items: &[ContentItem]) {
        self.frames
            .lock()
            .push(items.iter().map(|i| i.id.clone()).collect());
    }
}
