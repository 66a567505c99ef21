// src/follow.rs
//! Follow graph: the creators the user already follows, paginated and cached.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{self, keys, CacheStore};
use crate::error::{FeedError, Result};
use crate::model::Creator;
use crate::platform::PlatformClient;
use crate::telemetry::anon_hash;

fn default_page_size() -> usize {
    50
}
fn default_max_creators() -> usize {
    500
}
fn default_ttl_secs() -> u64 {
    24 * 3600
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_creators")]
    pub max_creators: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_creators: default_max_creators(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

pub struct FollowGraphFetcher {
    client: Arc<dyn PlatformClient>,
    cache: Arc<dyn CacheStore>,
    cfg: FollowConfig,
}

impl FollowGraphFetcher {
    pub fn new(client: Arc<dyn PlatformClient>, cache: Arc<dyn CacheStore>, cfg: FollowConfig) -> Self {
        Self { client, cache, cfg }
    }

    /// Cached list if present; otherwise page through the follow list with
    /// `request_delay` between pages.
    ///
    /// A failure on the first page is returned as-is. A failure on a later
    /// page returns what was accumulated so far without caching it.
    pub async fn fetch_followed_creators(
        &self,
        user_id: &str,
        request_delay: Duration,
    ) -> Result<Vec<Creator>> {
        if !self.client.is_logged_in().await {
            warn!(target: "follow", "no session evidence; aborting follow fetch");
            return Err(FeedError::NotAuthenticated);
        }

        let platform = self.client.platform().to_string();
        let key = keys::follow_list(&platform, user_id);
        let user = anon_hash(user_id);

        match cache::get_json::<Vec<Creator>>(self.cache.as_ref(), &key).await {
            Ok(Some(list)) if !list.is_empty() => {
                debug!(target: "follow", %user, creators = list.len(), "follow list cache hit");
                return Ok(list);
            }
            Ok(_) => {}
            Err(e) => warn!(target: "follow", %user, error = %e, "follow cache read failed"),
        }

        info!(target: "follow", %user, page_size = self.cfg.page_size, "follow fetch start");
        let page_size = self.cfg.page_size.max(1);
        let mut seen = HashSet::new();
        let mut creators: Vec<Creator> = Vec::new();
        let mut page: u32 = 1;
        let mut complete = true;

        loop {
            let batch = match self.client.fetch_follow_page(user_id, page, page_size).await {
                Ok(b) => b,
                Err(e) if page == 1 || e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(target: "follow", %user, page, error = %e, "follow page failed; keeping partial list");
                    complete = false;
                    break;
                }
            };
            let got = batch.len();
            for c in batch {
                if seen.insert(c.id.clone()) {
                    creators.push(c);
                }
            }
            debug!(target: "follow", %user, page, got, total = creators.len(), "follow page fetched");

            if creators.len() >= self.cfg.max_creators {
                creators.truncate(self.cfg.max_creators);
                break;
            }
            if got < page_size {
                break;
            }
            page += 1;
            tokio::time::sleep(request_delay).await;
        }

        info!(target: "follow", %user, pages = page, creators = creators.len(), complete, "follow fetch end");

        if creators.is_empty() {
            return Err(FeedError::NoFollowedCreators);
        }
        if complete {
            let ttl = Duration::from_secs(self.cfg.ttl_secs);
            if let Err(e) = cache::set_json(self.cache.as_ref(), &key, &creators, ttl).await {
                warn!(target: "follow", %user, error = %e, "follow cache write failed");
            }
        }
        Ok(creators)
    }
}
