//! Metric names, one-time descriptions and log-safe identifiers.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub const POOL_FETCH_TOTAL: &str = "feed_pool_fetch_total";
pub const POOL_FETCH_ERRORS_TOTAL: &str = "feed_pool_fetch_errors_total";
pub const POOL_FETCH_MS: &str = "feed_pool_fetch_ms";
pub const RATE_LIMITED_TOTAL: &str = "feed_rate_limited_total";
pub const MERGE_APPLIED_TOTAL: &str = "feed_merge_applied_total";
pub const BREAKER_TRIPPED_TOTAL: &str = "feed_breaker_tripped_total";
pub const HISTORY_RESETS_TOTAL: &str = "feed_history_resets_total";
pub const ITEMS_EVICTED_TOTAL: &str = "feed_items_evicted_total";
pub const SELECTION_SIZE: &str = "feed_selection_size";
pub const REFRESH_LAST_RUN_TS: &str = "feed_refresh_last_run_ts";

/// One-time metrics registration (so series show up once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(POOL_FETCH_TOTAL, "Creator pool network fetch attempts.");
        describe_counter!(
            POOL_FETCH_ERRORS_TOTAL,
            "Creator pool fetch attempts that failed."
        );
        describe_histogram!(POOL_FETCH_MS, "Creator pool fetch time in milliseconds.");
        describe_counter!(RATE_LIMITED_TOTAL, "Upstream rate-limit responses seen.");
        describe_counter!(MERGE_APPLIED_TOTAL, "Incremental pool merges persisted.");
        describe_counter!(
            BREAKER_TRIPPED_TOTAL,
            "Scheduler runs aborted by the rate-limit circuit breaker."
        );
        describe_counter!(HISTORY_RESETS_TOTAL, "Display history truncations.");
        describe_counter!(ITEMS_EVICTED_TOTAL, "Items evicted as stale.");
        describe_histogram!(SELECTION_SIZE, "Items handed to the renderer per selection.");
        describe_gauge!(REFRESH_LAST_RUN_TS, "Unix ts when a refresh cycle last started.");
    });
}

/// Short anonymized id for logs. Raw user ids never reach the log stream.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("user-1001");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("user-1001"));
        assert_ne!(a, anon_hash("user-1002"));
        assert!(!a.contains("1001"));
    }

    #[test]
    fn describing_twice_is_harmless() {
        ensure_metrics_described();
        ensure_metrics_described();
    }
}
