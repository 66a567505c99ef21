// src/platform/http.rs
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::wire::{decode_envelope, parse_follow_page, parse_item_page};
use super::PlatformClient;
use crate::error::{FeedError, Result};
use crate::model::{ContentItem, Creator};

pub const ENV_SESSION_COOKIE: &str = "FEED_SESSION_COOKIE";

fn default_base_url() -> String {
    "https://api.bilibili.com".to_string()
}
fn default_follow_path() -> String {
    "/x/relation/followings".to_string()
}
fn default_items_path() -> String {
    "/x/space/arc/search".to_string()
}
fn default_item_url_base() -> String {
    "https://www.bilibili.com/video".to_string()
}
fn default_referer() -> String {
    "https://www.bilibili.com/".to_string()
}
fn default_cookie_name() -> String {
    "SESSDATA".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_follow_path")]
    pub follow_path: String,
    #[serde(default = "default_items_path")]
    pub items_path: String,
    #[serde(default = "default_item_url_base")]
    pub item_url_base: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,
    /// Session credential; when empty the client reports "not logged in".
    #[serde(default, skip_serializing)]
    pub session_cookie: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            follow_path: default_follow_path(),
            items_path: default_items_path(),
            item_url_base: default_item_url_base(),
            referer: default_referer(),
            session_cookie_name: default_cookie_name(),
            session_cookie: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    /// Fill the session credential from `FEED_SESSION_COOKIE` when unset.
    pub fn with_env_session(mut self) -> Self {
        if self.session_cookie.as_deref().map_or(true, str::is_empty) {
            self.session_cookie = std::env::var(ENV_SESSION_COOKIE)
                .ok()
                .filter(|v| !v.trim().is_empty());
        }
        self
    }
}

pub struct HttpPlatformClient {
    http: reqwest::Client,
    platform: String,
    cfg: HttpClientConfig,
}

impl HttpPlatformClient {
    pub fn new(platform: impl Into<String>, cfg: HttpClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("follow-feed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .map_err(|e| FeedError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            platform: platform.into(),
            cfg,
        })
    }

    fn session_cookie(&self) -> Option<&str> {
        self.cfg
            .session_cookie
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        let referer = HeaderValue::from_str(&self.cfg.referer)
            .map_err(|e| FeedError::Config(format!("referer header: {e}")))?;
        h.insert(REFERER, referer);
        if let Some(c) = self.session_cookie() {
            let cookie = HeaderValue::from_str(&format!("{}={}", self.cfg.session_cookie_name, c))
                .map_err(|e| FeedError::Config(format!("cookie header: {e}")))?;
            h.insert(COOKIE, cookie);
        }
        Ok(h)
    }

    async fn get_data(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path);
        let resp = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PRECONDITION_FAILED {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FeedError::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(FeedError::NotAuthenticated);
        }
        if !status.is_success() {
            return Err(FeedError::TransientNetwork(format!("HTTP {status} from {path}")));
        }

        let body = resp.text().await?;
        decode_envelope(&body)
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn is_logged_in(&self) -> bool {
        self.session_cookie().is_some()
    }

    async fn fetch_follow_page(
        &self,
        user_id: &str,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Creator>> {
        let query = [
            ("vmid", user_id.to_string()),
            ("pn", page.to_string()),
            ("ps", page_size.to_string()),
        ];
        let data = self.get_data(&self.cfg.follow_path, &query).await?;
        parse_follow_page(&self.platform, data)
    }

    async fn fetch_creator_items(
        &self,
        creator: &Creator,
        pool_size: usize,
    ) -> Result<Vec<ContentItem>> {
        let query = [
            ("mid", creator.platform_id.clone()),
            ("pn", "1".to_string()),
            ("ps", pool_size.to_string()),
            // popularity order spreads the pool over the creator's whole catalogue
            ("order", "click".to_string()),
        ];
        let data = self.get_data(&self.cfg.items_path, &query).await?;
        parse_item_page(&self.platform, creator, data, &self.cfg.item_url_base)
    }
}
