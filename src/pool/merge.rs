// src/pool/merge.rs
use std::collections::{HashMap, HashSet};

use crate::model::ContentItem;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub before: usize,
    pub after: usize,
    /// Ids not present before the merge.
    pub added: usize,
    /// Existing ids superseded by fetched data.
    pub refreshed: usize,
}

/// Incremental merge: `existing ∪ fetched` keyed by id, fetched data wins on
/// collision, result sorted by `published_at` descending (ties by id).
pub fn merge_incremental(existing: &[ContentItem], fetched: Vec<ContentItem>) -> Vec<ContentItem> {
    merge_with_stats(existing, fetched).0
}

pub fn merge_with_stats(
    existing: &[ContentItem],
    fetched: Vec<ContentItem>,
) -> (Vec<ContentItem>, MergeStats) {
    let mut by_id: HashMap<String, ContentItem> =
        HashMap::with_capacity(existing.len() + fetched.len());
    for it in existing {
        by_id.insert(it.id.clone(), it.clone());
    }
    let before = by_id.len();
    let mut known: HashSet<&str> = existing.iter().map(|e| e.id.as_str()).collect();

    let mut added = 0usize;
    let mut refreshed = 0usize;
    for it in fetched {
        let known_before = known.remove(it.id.as_str());
        match by_id.insert(it.id.clone(), it) {
            None => added += 1,
            Some(_) if known_before => refreshed += 1,
            // duplicate inside the fetched batch itself
            Some(_) => {}
        }
    }

    let mut out: Vec<ContentItem> = by_id.into_values().collect();
    out.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let stats = MergeStats {
        before,
        after: out.len(),
        added,
        refreshed,
    };
    (out, stats)
}
