// src/scheduler/breaker.rs
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Per-run breaker state. Built fresh at the start of every update run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulerState {
    pub consecutive_rate_limit_hits: u32,
    pub last_rate_limit_at: Option<DateTime<Utc>>,
    pub mode: SchedulerMode,
}

impl SchedulerState {
    pub fn new(mode: SchedulerMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Count a rate-limit signal. A hit arriving after the cooldown window
    /// has elapsed since the previous one starts a new streak.
    pub fn record_rate_limit(&mut self, now: DateTime<Utc>, cooldown: Duration) -> u32 {
        let within = self
            .last_rate_limit_at
            .is_some_and(|prev| now - prev <= cooldown);
        self.consecutive_rate_limit_hits = if within {
            self.consecutive_rate_limit_hits.saturating_add(1)
        } else {
            1
        };
        self.last_rate_limit_at = Some(now);
        self.consecutive_rate_limit_hits
    }

    pub fn record_success(&mut self) {
        self.consecutive_rate_limit_hits = 0;
    }

    pub fn is_tripped(&self, threshold: u32) -> bool {
        self.consecutive_rate_limit_hits >= threshold.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn two_hits_inside_window_trip() {
        let mut s = SchedulerState::new(SchedulerMode::Sequential);
        let cd = Duration::minutes(10);
        assert_eq!(s.record_rate_limit(t(0), cd), 1);
        assert!(!s.is_tripped(2));
        assert_eq!(s.record_rate_limit(t(60), cd), 2);
        assert!(s.is_tripped(2));
    }

    #[test]
    fn stale_hit_starts_new_streak() {
        let mut s = SchedulerState::default();
        let cd = Duration::minutes(10);
        s.record_rate_limit(t(0), cd);
        assert_eq!(s.record_rate_limit(t(11 * 60), cd), 1);
        assert!(!s.is_tripped(2));
    }

    #[test]
    fn success_resets_streak() {
        let mut s = SchedulerState::default();
        let cd = Duration::minutes(10);
        s.record_rate_limit(t(0), cd);
        s.record_success();
        assert_eq!(s.consecutive_rate_limit_hits, 0);
        assert_eq!(s.record_rate_limit(t(30), cd), 1);
    }
}
