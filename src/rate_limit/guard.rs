//! Admission guard: holds a concurrency permit for the duration of one
//! protected operation and applies the scope cooldown when it finishes.

use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;

use super::limiter::RateLimiter;

/// An admitted request. Consumed by `succeed()`, `fail()` or `finish()`.
///
/// Finishing records the outcome, releases the concurrency permit and then
/// sleeps the scope cooldown. If the guard is dropped without being finished
/// (e.g. the task was cancelled), the permit is still released but neither
/// the outcome nor the cooldown is applied.
#[must_use = "finish the guard to record the outcome and apply the cooldown"]
pub struct AdmissionGuard {
    limiter: RateLimiter,
    scope: String,
    cooldown: Duration,
    waited: Duration,
    permit: Option<OwnedSemaphorePermit>,
    finished: bool,
}

impl AdmissionGuard {
    pub(crate) fn new(
        limiter: RateLimiter,
        scope: String,
        cooldown: Duration,
        waited: Duration,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            limiter,
            scope,
            cooldown,
            waited,
            permit,
            finished: false,
        }
    }

    /// Effective scope the request was admitted under.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// How long admission waited for the rate limits.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether this guard occupies one of the scope's concurrency slots.
    pub fn holds_permit(&self) -> bool {
        self.permit.is_some()
    }

    pub async fn succeed(self) {
        self.finish(true).await;
    }

    pub async fn fail(self) {
        self.finish(false).await;
    }

    pub async fn finish(mut self, success: bool) {
        self.finished = true;
        self.limiter.record_outcome(&self.scope, success).await;

        // Cooldown throttles this caller only; the slot is free for others.
        drop(self.permit.take());

        if !self.cooldown.is_zero() {
            tracing::debug!("Cooldown for {}: {:?}", self.scope, self.cooldown);
        }
        self.limiter.clock().sleep(self.cooldown).await;
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "AdmissionGuard for {} dropped without being finished; \
                 permit released, outcome and cooldown skipped",
                self.scope
            );
        }
    }
}

impl std::fmt::Debug for AdmissionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGuard")
            .field("scope", &self.scope)
            .field("cooldown", &self.cooldown)
            .field("waited", &self.waited)
            .field("holds_permit", &self.permit.is_some())
            .finish()
    }
}
