//! Token bucket with continuous refill.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::clock::Clock;

#[derive(Debug)]
struct BucketState {
    /// Available tokens. Negative while deferred acquirers hold reservations
    /// against future refill.
    balance: f64,
    last_update: Instant,
}

/// Burst-capped rate source for a single scope.
///
/// An acquisition that cannot be served immediately reserves its tokens and
/// reports how long until refill covers them. Callers that wait that long are
/// admitted without asking again, and concurrent deferred callers get
/// staggered waits instead of all seeing the same deficit.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket. `rate` is tokens per second and must be positive.
    pub fn new(rate: f64, capacity: u32, clock: Arc<dyn Clock>) -> Self {
        let capacity = f64::from(capacity);
        Self {
            rate,
            capacity,
            state: Mutex::new(BucketState {
                balance: capacity,
                last_update: clock.now(),
            }),
            clock,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Take `tokens` from the bucket. Returns zero if they were available now,
    /// otherwise the time until the reservation is covered by refill.
    pub fn acquire(&self, tokens: u32) -> Duration {
        let requested = f64::from(tokens);
        let mut state = self.lock_refilled();

        if state.balance >= requested {
            state.balance -= requested;
            return Duration::ZERO;
        }

        let wait = self.deficit_wait(requested - state.balance);
        state.balance -= requested;
        wait
    }

    /// Time until `tokens` could be taken, without reserving anything.
    pub fn time_until_available(&self, tokens: u32) -> Duration {
        let requested = f64::from(tokens);
        let state = self.lock_refilled();
        if state.balance >= requested {
            Duration::ZERO
        } else {
            self.deficit_wait(requested - state.balance)
        }
    }

    /// Currently available tokens, always within `[0, capacity]`.
    pub fn tokens(&self) -> f64 {
        self.lock_refilled().balance.clamp(0.0, self.capacity)
    }

    /// Refill to capacity and drop outstanding reservations.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.balance = self.capacity;
        state.last_update = self.clock.now();
    }

    fn deficit_wait(&self, deficit: f64) -> Duration {
        Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(Duration::MAX)
    }

    fn lock_refilled(&self) -> MutexGuard<'_, BucketState> {
        let mut state = self.lock();
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_update).as_secs_f64();
        state.balance = (state.balance + elapsed * self.rate).min(self.capacity);
        state.last_update = now;
        state
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
