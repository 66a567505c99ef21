//! Error taxonomy for the acquisition core.
//!
//! Only [`FeedError::NotAuthenticated`] and [`FeedError::NoFollowedCreators`]
//! are allowed to escape a refresh cycle. Everything else is contained at the
//! creator level and degrades to "serve what's cached".

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("no login evidence for the platform session")]
    NotAuthenticated,

    #[error("upstream rate limited the request (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("the user follows no creators")]
    NoFollowedCreators,

    #[error("cache store error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Errors that take the retry path. Malformed payloads are not retried
    /// but still burn an attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::RateLimited { .. } | FeedError::TransientNetwork(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FeedError::RateLimited { .. })
    }

    /// Fatal to the whole refresh cycle (surfaced to the user).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::NotAuthenticated | FeedError::NoFollowedCreators
        )
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FeedError::MalformedResponse(e.to_string())
        } else {
            FeedError::TransientNetwork(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::MalformedResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
