// src/selection/history.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ids already shown, in the order they were first shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct DisplayHistory {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl From<Vec<String>> for DisplayHistory {
    fn from(ids: Vec<String>) -> Self {
        let mut h = DisplayHistory::default();
        h.extend(ids);
        h
    }
}

impl From<DisplayHistory> for Vec<String> {
    fn from(h: DisplayHistory) -> Self {
        h.order
    }
}

impl DisplayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns false when the id was already recorded.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            self.insert(id);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Keep only the `keep` most recently added ids. Returns how many were dropped.
    pub fn truncate_to_recent(&mut self, keep: usize) -> usize {
        if self.order.len() <= keep {
            return 0;
        }
        let cut = self.order.len() - keep;
        for id in self.order.drain(..cut) {
            self.seen.remove(&id);
        }
        cut
    }
}
