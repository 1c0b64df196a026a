//! Rate limiter configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{RateLimitError, RateLimitResult};

/// Trailing window for the per-minute cap.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Trailing window for the per-hour cap. History older than this is pruned.
pub const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Limits applied to a single scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Token refill rate.
    pub requests_per_second: f64,
    /// Sliding-window cap over the last 60 seconds.
    pub requests_per_minute: u32,
    /// Sliding-window cap over the last hour.
    pub requests_per_hour: u32,
    /// Bucket capacity.
    pub burst_size: u32,
    /// Pause after each guarded request, before the caller continues.
    #[serde(default)]
    pub cooldown_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            requests_per_minute: 300,
            requests_per_hour: 10_000,
            burst_size: 20,
            cooldown_seconds: 0.0,
        }
    }
}

impl RateLimitConfig {
    pub fn new(
        requests_per_second: f64,
        requests_per_minute: u32,
        requests_per_hour: u32,
        burst_size: u32,
        cooldown_seconds: f64,
    ) -> Self {
        Self {
            requests_per_second,
            requests_per_minute,
            requests_per_hour,
            burst_size,
            cooldown_seconds,
        }
    }

    /// Reject values the bucket and window arithmetic cannot work with.
    pub fn validate(&self, scope: &str) -> RateLimitResult<()> {
        let invalid = |reason: &str| {
            Err(RateLimitError::InvalidConfig {
                scope: scope.to_string(),
                reason: reason.to_string(),
            })
        };

        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return invalid("requests_per_second must be a positive number");
        }
        if self.requests_per_minute == 0 {
            return invalid("requests_per_minute must be greater than zero");
        }
        if self.requests_per_hour == 0 {
            return invalid("requests_per_hour must be greater than zero");
        }
        if self.burst_size == 0 {
            return invalid("burst_size must be greater than zero");
        }
        if !self.cooldown_seconds.is_finite() || self.cooldown_seconds < 0.0 {
            return invalid("cooldown_seconds must be zero or positive");
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_seconds).unwrap_or(Duration::ZERO)
    }
}
