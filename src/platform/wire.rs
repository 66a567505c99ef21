// src/platform/wire.rs
//! Validated parse of upstream payloads into typed records.
//!
//! Envelope: `{ "code": 0, "message": "...", "data": {...}, "retry_after": 30 }`.

use chrono::DateTime;
use serde::Deserialize;
use std::time::Duration;

use super::text::{normalize_description, normalize_title, parse_clock_duration};
use crate::error::{FeedError, Result};
use crate::model::{scoped_id, ContentItem, ContentMetrics, ContentType, Creator};

pub const SUCCESS_CODE: i64 = 0;
pub const NOT_LOGGED_IN_CODE: i64 = -101;
pub const RATE_LIMIT_CODE: i64 = -412;
/// Upstream-side failures worth retrying.
pub const TRANSIENT_CODES: &[i64] = &[-500, -502, -503, -504];

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Decode the envelope and return its `data` on success.
pub fn decode_envelope(body: &str) -> Result<serde_json::Value> {
    let env: Envelope = serde_json::from_str(body.trim())?;
    let message = env.message.unwrap_or_default();
    match env.code {
        SUCCESS_CODE => env
            .data
            .ok_or_else(|| FeedError::MalformedResponse("success envelope without data".into())),
        RATE_LIMIT_CODE => Err(FeedError::RateLimited {
            retry_after: env.retry_after.map(Duration::from_secs),
        }),
        NOT_LOGGED_IN_CODE => Err(FeedError::NotAuthenticated),
        c if TRANSIENT_CODES.contains(&c) => {
            Err(FeedError::TransientNetwork(format!("upstream code {c}: {message}")))
        }
        c => Err(FeedError::MalformedResponse(format!(
            "unexpected upstream code {c}: {message}"
        ))),
    }
}

/// Upstream ids arrive as numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Num(u64),
    Str(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Num(n) => n.to_string(),
            WireId::Str(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireDuration {
    Secs(u64),
    Clock(String),
}

/// Counters sometimes arrive as strings (`"--"` when hidden).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireCount {
    Num(u64),
    Str(String),
}

impl WireCount {
    fn value(self) -> Option<u64> {
        match self {
            WireCount::Num(n) => Some(n),
            WireCount::Str(s) => s.trim().parse().ok(),
        }
    }
}

/// `type` is -1 for unverified accounts.
#[derive(Debug, Deserialize)]
struct OfficialVerify {
    #[serde(rename = "type")]
    kind: i64,
}

#[derive(Debug, Deserialize)]
struct WireCreator {
    #[serde(alias = "mid")]
    id: WireId,
    #[serde(alias = "uname")]
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, alias = "face")]
    avatar: Option<String>,
    #[serde(default)]
    verified: Option<bool>,
    #[serde(default)]
    official_verify: Option<OfficialVerify>,
}

#[derive(Debug, Deserialize)]
struct FollowPage {
    list: Vec<WireCreator>,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(alias = "bvid")]
    id: WireId,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "pic")]
    thumbnail: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// unix seconds
    #[serde(alias = "created")]
    published_at: i64,
    #[serde(default, alias = "play")]
    views: Option<WireCount>,
    #[serde(default)]
    likes: Option<WireCount>,
    #[serde(default, alias = "comment")]
    comments: Option<WireCount>,
    #[serde(default, alias = "length")]
    duration: Option<WireDuration>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Either a flat `list` or the space-search shape `list.vlist`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemList {
    Flat(Vec<WireItem>),
    Nested {
        #[serde(default)]
        vlist: Vec<WireItem>,
    },
}

#[derive(Debug, Deserialize)]
struct ItemPage {
    list: ItemList,
}

impl ItemPage {
    fn into_items(self) -> Vec<WireItem> {
        match self.list {
            ItemList::Flat(v) | ItemList::Nested { vlist: v } => v,
        }
    }
}

/// Protocol-relative image urls (`//host/x.jpg`) get an https scheme.
fn absolute_url(raw: String) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else if let Some(rest) = t.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else {
        Some(t.to_string())
    }
}

pub fn parse_follow_page(platform: &str, data: serde_json::Value) -> Result<Vec<Creator>> {
    let page: FollowPage = serde_json::from_value(data)?;
    let raw = page.list.len();

    let out: Vec<Creator> = page
        .list
        .into_iter()
        .filter_map(|w| {
            let platform_id = w.id.into_string();
            let username = w.username.trim().to_string();
            if platform_id.is_empty() || username.is_empty() {
                return None;
            }
            let display_name = w
                .display_name
                .map(|n| normalize_title(&n))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| username.clone());
            Some(Creator {
                id: scoped_id(platform, &platform_id),
                platform_id,
                username,
                display_name,
                avatar: w.avatar.and_then(absolute_url),
                verified: w.verified.or(w.official_verify.map(|v| v.kind >= 0)),
            })
        })
        .collect();

    if raw > 0 && out.is_empty() {
        return Err(FeedError::MalformedResponse(
            "follow page contained no valid creators".into(),
        ));
    }
    Ok(out)
}

/// `item_url_base` is used when a record carries no url of its own.
pub fn parse_item_page(
    platform: &str,
    creator: &Creator,
    data: serde_json::Value,
    item_url_base: &str,
) -> Result<Vec<ContentItem>> {
    let page: ItemPage = serde_json::from_value(data)?;
    let list = page.into_items();
    let raw = list.len();

    let mut out = Vec::with_capacity(raw);
    for w in list {
        let native = w.id.into_string();
        if native.is_empty() {
            continue;
        }
        let Some(published_at) = DateTime::from_timestamp(w.published_at, 0).filter(|_| w.published_at > 0)
        else {
            tracing::debug!(target: "pool", item = %native, "dropping item without valid timestamp");
            continue;
        };
        let url = w
            .url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{}/{}", item_url_base.trim_end_matches('/'), native));
        let duration_seconds = match w.duration {
            Some(WireDuration::Secs(n)) => u32::try_from(n).unwrap_or(u32::MAX),
            Some(WireDuration::Clock(s)) => parse_clock_duration(&s).unwrap_or(0),
            None => 0,
        };

        out.push(ContentItem {
            id: scoped_id(platform, &native),
            creator_id: creator.id.clone(),
            title: normalize_title(&w.title),
            description: normalize_description(w.description.as_deref()),
            thumbnail: w.thumbnail.and_then(absolute_url),
            url,
            published_at,
            metrics: ContentMetrics {
                views: w.views.and_then(WireCount::value),
                likes: w.likes.and_then(WireCount::value),
                comments: w.comments.and_then(WireCount::value),
            },
            duration_seconds,
            kind: parse_kind(w.kind.as_deref(), duration_seconds),
        });
    }

    if raw > 0 && out.is_empty() {
        return Err(FeedError::MalformedResponse(
            "item page contained no valid items".into(),
        ));
    }
    Ok(out)
}

fn parse_kind(raw: Option<&str>, duration_seconds: u32) -> ContentType {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("short") => ContentType::Short,
        Some("live") => ContentType::Live,
        Some("post") | Some("article") => ContentType::Post,
        Some("audio") => ContentType::Audio,
        Some("video") => ContentType::Video,
        // untyped records: vertical shorts are capped at one minute upstream
        _ if duration_seconds > 0 && duration_seconds <= 60 => ContentType::Short,
        _ => ContentType::Video,
    }
}
