//! Sliding-window request history for per-minute and per-hour caps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::config::{RateLimitConfig, HOUR_WINDOW, MINUTE_WINDOW};

/// Time-ordered request timestamps for one scope.
///
/// Entries are only ever appended with the current time and pruned from the
/// front, so the deque stays sorted.
#[derive(Debug, Default)]
pub struct RequestHistory {
    entries: VecDeque<Instant>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a request made at `now`.
    pub fn record(&mut self, now: Instant) {
        if let Some(&last) = self.entries.back() {
            // A clock that stepped backwards must not break ordering.
            self.entries.push_back(now.max(last));
        } else {
            self.entries.push_back(now);
        }
    }

    /// Drop entries older than the hour horizon.
    pub fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.entries.front() {
            if now.saturating_duration_since(oldest) > HOUR_WINDOW {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait required before another request fits under the caps.
    ///
    /// The minute cap is checked first; the hour cap only applies when the
    /// minute cap is not already binding.
    pub fn check(&mut self, now: Instant, config: &RateLimitConfig) -> Duration {
        self.prune(now);

        let minute_start = now.checked_sub(MINUTE_WINDOW);
        let in_minute = |t: &Instant| minute_start.map_or(true, |start| *t > start);

        // Sorted, so the minute window is a suffix of the history.
        let first_in_minute = self.entries.partition_point(|t| !in_minute(t));
        let minute_count = self.entries.len() - first_in_minute;

        if minute_count >= config.requests_per_minute as usize {
            let reference = self
                .entries
                .get(first_in_minute)
                .copied()
                .or(minute_start)
                .unwrap_or(now);
            return (reference + MINUTE_WINDOW).saturating_duration_since(now);
        }

        if self.entries.len() >= config.requests_per_hour as usize {
            if let Some(&oldest) = self.entries.front() {
                return (oldest + HOUR_WINDOW).saturating_duration_since(now);
            }
        }

        Duration::ZERO
    }

    /// Check the caps, then record this request regardless of the verdict.
    pub fn check_and_record(&mut self, now: Instant, config: &RateLimitConfig) -> Duration {
        let wait = self.check(now, config);
        self.record(now);
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(per_minute: u32, per_hour: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_hour: per_hour,
            ..Default::default()
        }
    }

    #[test]
    fn test_minute_cap_blocks_until_oldest_ages_out() {
        let cfg = config(2, 100);
        let mut history = RequestHistory::new();
        let t0 = Instant::now();

        assert_eq!(history.check_and_record(t0, &cfg), Duration::ZERO);
        let t1 = t0 + Duration::from_secs(10);
        assert_eq!(history.check_and_record(t1, &cfg), Duration::ZERO);

        let t2 = t0 + Duration::from_secs(15);
        assert_eq!(history.check(t2, &cfg), Duration::from_secs(45));

        // Once t0 is more than a minute old there is room again.
        let t3 = t0 + Duration::from_secs(61);
        assert_eq!(history.check(t3, &cfg), Duration::ZERO);
    }

    #[test]
    fn test_hour_cap_uses_oldest_entry() {
        let cfg = config(100, 3);
        let mut history = RequestHistory::new();
        let t0 = Instant::now();

        for i in 0..3 {
            history.record(t0 + Duration::from_secs(i * 120));
        }

        let now = t0 + Duration::from_secs(600);
        assert_eq!(history.check(now, &cfg), Duration::from_secs(3000));
    }

    #[test]
    fn test_minute_cap_takes_precedence_over_hour_cap() {
        let cfg = config(1, 1);
        let mut history = RequestHistory::new();
        let t0 = Instant::now();

        history.record(t0);
        let now = t0 + Duration::from_secs(20);
        assert_eq!(history.check(now, &cfg), Duration::from_secs(40));
    }

    #[test]
    fn test_prune_removes_entries_past_hour() {
        let mut history = RequestHistory::new();
        let t0 = Instant::now();
        assert!(history.is_empty());

        history.record(t0);
        history.record(t0 + Duration::from_secs(1800));
        history.prune(t0 + Duration::from_secs(3601));
        assert_eq!(history.len(), 1);

        history.prune(t0 + Duration::from_secs(5401));
        assert!(history.is_empty());
    }

    #[test]
    fn test_record_keeps_order() {
        let mut history = RequestHistory::new();
        let t0 = Instant::now() + Duration::from_secs(5);

        history.record(t0);
        history.record(t0 - Duration::from_secs(1));

        let entries: Vec<_> = history.entries.iter().copied().collect();
        assert!(entries.windows(2).all(|w| w[0] <= w[1]));
    }
}
