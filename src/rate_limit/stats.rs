//! Per-scope request statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub throttled_requests: u64,
    pub failed_requests: u64,
    pub total_wait_time: Duration,
    pub last_request_time: Option<DateTime<Utc>>,
}

impl RequestStats {
    /// Percentage of requests that completed successfully.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }

    /// Mean wait over throttled requests.
    pub fn avg_wait(&self) -> Duration {
        if self.throttled_requests == 0 {
            return Duration::ZERO;
        }
        self.total_wait_time.div_f64(self.throttled_requests as f64)
    }

    pub(crate) fn record_admission(&mut self, wait: Duration) {
        self.total_requests += 1;
        if !wait.is_zero() {
            self.throttled_requests += 1;
            self.total_wait_time = self.total_wait_time.saturating_add(wait);
        }
        self.last_request_time = Some(Utc::now());
    }

    pub fn report(&self, scope: &str) -> ScopeReport {
        ScopeReport {
            scope: scope.to_string(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            throttled_requests: self.throttled_requests,
            failed_requests: self.failed_requests,
            total_wait_secs: self.total_wait_time.as_secs_f64(),
            success_rate: self.success_rate(),
            avg_wait_secs: self.avg_wait().as_secs_f64(),
            last_request: self
                .last_request_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string()),
        }
    }
}

/// Serializable snapshot of a scope's statistics with derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeReport {
    pub scope: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub throttled_requests: u64,
    pub failed_requests: u64,
    pub total_wait_secs: f64,
    pub success_rate: f64,
    pub avg_wait_secs: f64,
    pub last_request: String,
}
