//! Rate limiter error types.

/// Result type for rate limiter operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors raised while configuring the limiter.
///
/// Admission itself never fails: unknown scopes fall back to the global
/// limits and caller failures inside a guard are passed through untouched.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Invalid rate limit config for '{scope}': {reason}")]
    InvalidConfig { scope: String, reason: String },
    #[error("Concurrency limit for '{scope}' must be at least 1")]
    InvalidConcurrency { scope: String },
}
