// src/selection/mod.rs
//! Display selection across every cached creator pool.
//!
//! Candidates already in the display history are excluded. The newest
//! `ceil(count * freshness_ratio)` candidates are always picked and the rest
//! of the slots are filled with a uniform random sample of the remainder.
//! When the history has eaten most of what is known it is truncated so older
//! items can recirculate.

pub mod history;

use metrics::{counter, histogram};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::model::{ContentItem, CreatorPool};
use crate::telemetry::{HISTORY_RESETS_TOTAL, SELECTION_SIZE};

pub use history::DisplayHistory;

fn default_freshness_ratio() -> f64 {
    0.5
}
fn default_reset_display_ratio() -> f64 {
    0.8
}
fn default_reset_absolute_ceiling() -> usize {
    200
}
fn default_reset_low_water() -> usize {
    20
}
fn default_reset_retain() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionConfig {
    /// Share of each selection reserved for the most recent candidates.
    #[serde(default = "default_freshness_ratio")]
    pub freshness_ratio: f64,
    /// History covering this share of all known items triggers a reset.
    #[serde(default = "default_reset_display_ratio")]
    pub reset_display_ratio: f64,
    #[serde(default = "default_reset_absolute_ceiling")]
    pub reset_absolute_ceiling: usize,
    #[serde(default = "default_reset_low_water")]
    pub reset_low_water: usize,
    /// Most recent history entries kept by a reset.
    #[serde(default = "default_reset_retain")]
    pub reset_retain: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            freshness_ratio: default_freshness_ratio(),
            reset_display_ratio: default_reset_display_ratio(),
            reset_absolute_ceiling: default_reset_absolute_ceiling(),
            reset_low_water: default_reset_low_water(),
            reset_retain: default_reset_retain(),
        }
    }
}

/// Flatten pools into one candidate list, deduplicated by id (first pool
/// wins) and sorted newest first, ties by id.
pub fn collect_candidates(pools: &[CreatorPool]) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    let mut out: Vec<ContentItem> = pools
        .iter()
        .flat_map(|p| p.items.iter())
        .filter(|it| seen.insert(it.id.as_str()))
        .cloned()
        .collect();
    sort_newest_first(&mut out);
    out
}

fn sort_newest_first(items: &mut [ContentItem]) {
    items.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Whether the history should be truncated before selecting `count` items.
pub fn should_reset(
    cfg: &SelectionConfig,
    history_len: usize,
    total_known: usize,
    available: usize,
    count: usize,
) -> bool {
    if history_len == 0 {
        return false;
    }
    if available < count {
        return true;
    }
    if total_known > 0 && history_len as f64 / total_known as f64 >= cfg.reset_display_ratio {
        return true;
    }
    history_len > cfg.reset_absolute_ceiling && available < cfg.reset_low_water
}

/// How many history entries a reset keeps. Bounded by `reset_retain`, and
/// small enough that at least `count` known items become available again.
pub fn retain_after_reset(cfg: &SelectionConfig, history_len: usize, total_known: usize, count: usize) -> usize {
    cfg.reset_retain
        .min(total_known.saturating_sub(count))
        .min(history_len.saturating_sub(1))
}

/// Freshness picks plus a random fill. `available` must be sorted newest first.
pub fn pick<R: rand::Rng + ?Sized>(
    available: &[ContentItem],
    count: usize,
    freshness_ratio: f64,
    rng: &mut R,
) -> Vec<ContentItem> {
    let count = count.min(available.len());
    if count == 0 {
        return Vec::new();
    }
    let fresh = ((count as f64 * freshness_ratio).ceil() as usize).min(count);
    let (head, rest) = available.split_at(fresh);
    let mut out: Vec<ContentItem> = head.to_vec();
    let fill = (count - fresh).min(rest.len());
    for idx in rand::seq::index::sample(rng, rest.len(), fill).iter() {
        out.push(rest[idx].clone());
    }
    out
}

/// Selection state: the display history plus the candidate snapshot taken
/// by the last [`SelectionEngine::collect`].
pub struct SelectionEngine {
    cfg: SelectionConfig,
    history: DisplayHistory,
    candidates: Vec<ContentItem>,
    available: Vec<ContentItem>,
    rng: StdRng,
}

impl SelectionEngine {
    pub fn new(cfg: SelectionConfig) -> Self {
        Self::with_rng(cfg, StdRng::from_os_rng())
    }

    /// Deterministic sampling for tests and replays.
    pub fn with_seed(cfg: SelectionConfig, seed: u64) -> Self {
        Self::with_rng(cfg, StdRng::seed_from_u64(seed))
    }

    fn with_rng(cfg: SelectionConfig, rng: StdRng) -> Self {
        Self {
            cfg,
            history: DisplayHistory::new(),
            candidates: Vec::new(),
            available: Vec::new(),
            rng,
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.cfg
    }

    pub fn history(&self) -> &DisplayHistory {
        &self.history
    }

    /// Replace the history (e.g. restored from the cache store).
    pub fn set_history(&mut self, history: DisplayHistory) {
        self.history = history;
        self.rebuild_available();
    }

    pub fn total_known(&self) -> usize {
        self.candidates.len()
    }

    /// Candidates not yet shown, newest first.
    pub fn available(&self) -> &[ContentItem] {
        &self.available
    }

    /// Take a fresh candidate snapshot from `pools`.
    pub fn collect(&mut self, pools: &[CreatorPool]) {
        self.candidates = collect_candidates(pools);
        self.rebuild_available();
        debug!(
            target: "selection",
            known = self.candidates.len(),
            available = self.available.len(),
            history = self.history.len(),
            "candidates collected"
        );
    }

    fn rebuild_available(&mut self) {
        let history = &self.history;
        self.available = self
            .candidates
            .iter()
            .filter(|it| !history.contains(&it.id))
            .cloned()
            .collect();
    }

    /// Select up to `count` items from the current snapshot and commit them
    /// to the history. Empty when nothing is left even after a reset.
    pub fn select(&mut self, count: usize) -> Vec<ContentItem> {
        if should_reset(
            &self.cfg,
            self.history.len(),
            self.candidates.len(),
            self.available.len(),
            count,
        ) {
            self.reset_history(count);
        }

        let picked = pick(&self.available, count, self.cfg.freshness_ratio, &mut self.rng);
        if picked.is_empty() {
            info!(target: "selection", known = self.candidates.len(), "nothing to show");
            histogram!(SELECTION_SIZE).record(0.0);
            return picked;
        }

        let chosen: HashSet<&str> = picked.iter().map(|it| it.id.as_str()).collect();
        self.available.retain(|it| !chosen.contains(it.id.as_str()));
        self.history.extend(picked.iter().map(|it| it.id.clone()));

        histogram!(SELECTION_SIZE).record(picked.len() as f64);
        info!(
            target: "selection",
            selected = picked.len(),
            available = self.available.len(),
            history = self.history.len(),
            "selection committed"
        );
        picked
    }

    /// `collect` then `select`.
    pub fn select_for_display(&mut self, pools: &[CreatorPool], count: usize) -> Vec<ContentItem> {
        self.collect(pools);
        self.select(count)
    }

    fn reset_history(&mut self, count: usize) {
        let keep = retain_after_reset(&self.cfg, self.history.len(), self.candidates.len(), count);
        let dropped = self.history.truncate_to_recent(keep);
        if dropped == 0 {
            return;
        }
        self.rebuild_available();
        counter!(HISTORY_RESETS_TOTAL).increment(1);
        info!(
            target: "selection",
            dropped,
            kept = self.history.len(),
            available = self.available.len(),
            "display history reset"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentMetrics, ContentType};
    use chrono::DateTime;

    fn item(n: i64) -> ContentItem {
        ContentItem {
            id: format!("p:{n}"),
            creator_id: "p:c".into(),
            title: format!("item {n}"),
            description: None,
            thumbnail: None,
            url: format!("https://example.invalid/{n}"),
            published_at: DateTime::from_timestamp(1_700_000_000 + n * 60, 0).unwrap(),
            metrics: ContentMetrics::default(),
            duration_seconds: 120,
            kind: ContentType::Video,
        }
    }

    #[test]
    fn reset_rules() {
        let cfg = SelectionConfig::default();
        assert!(!should_reset(&cfg, 0, 10, 0, 5));
        assert!(should_reset(&cfg, 5, 10, 3, 5));
        assert!(should_reset(&cfg, 80, 100, 20, 5));
        assert!(!should_reset(&cfg, 79, 100, 21, 5));
        assert!(should_reset(&cfg, 201, 1000, 19, 5));
        assert!(!should_reset(&cfg, 201, 1000, 799, 5));
    }

    #[test]
    fn retain_leaves_room_for_a_full_selection() {
        let cfg = SelectionConfig::default();
        assert_eq!(retain_after_reset(&cfg, 850, 1000, 12), 50);
        assert_eq!(retain_after_reset(&cfg, 25, 30, 10), 20);
        assert_eq!(retain_after_reset(&cfg, 5, 5, 10), 0);
    }

    #[test]
    fn pick_takes_freshest_head() {
        let items: Vec<_> = (0..10).rev().map(item).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let out = pick(&items, 4, 0.5, &mut rng);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].id, "p:9");
        assert_eq!(out[1].id, "p:8");
        let ids: HashSet<_> = out.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn pick_handles_short_supply() {
        let items: Vec<_> = (0..3).map(item).collect();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick(&items, 10, 0.5, &mut rng).len(), 3);
        assert!(pick(&[], 10, 0.5, &mut rng).is_empty());
    }

    #[test]
    fn collect_dedups_across_pools() {
        let a = CreatorPool::from_items("p:a", vec![item(1), item(2)]);
        let b = CreatorPool::from_items("p:b", vec![item(2), item(3)]);
        let out = collect_candidates(&[a, b]);
        let ids: Vec<_> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["p:3", "p:2", "p:1"]);
    }
}
