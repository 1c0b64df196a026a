//! scrapegate - admission control for scraping pipelines.
//!
//! Decides when outbound requests may proceed under global, per-retailer and
//! per-domain limits, and dispatches pending jobs through a priority queue.

pub mod config;
pub mod priority;
pub mod rate_limit;
pub mod work_queue;

pub use config::{AdmissionConfig, ConfigError};
pub use priority::Priority;
pub use rate_limit::{
    AdmissionGuard, Clock, ManualClock, RateLimitConfig, RateLimitError, RateLimiter,
    RequestTarget, ScopeKey, TokenBucket, TokioClock,
};
pub use work_queue::{QueueError, QueueItem, RequestQueue};
