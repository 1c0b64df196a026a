//! Rate limiting for outbound scraper requests.
//!
//! Each request is admitted against three independent gates:
//! - token buckets (global plus the effective scope's own bucket)
//! - per-minute and per-hour sliding windows for the effective scope
//! - an optional concurrency cap for the effective scope
//!
//! State is held in memory for a single process.

mod bucket;
mod clock;
mod config;
mod error;
mod guard;
mod limiter;
mod scope;
mod stats;
mod window;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{RateLimitConfig, HOUR_WINDOW, MINUTE_WINDOW};
pub use error::{RateLimitError, RateLimitResult};
pub use guard::AdmissionGuard;
pub use limiter::RateLimiter;
pub use scope::{RequestTarget, ScopeKey, GLOBAL_SCOPE};
pub use stats::{RequestStats, ScopeReport};
pub use window::RequestHistory;
