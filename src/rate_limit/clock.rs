//! Time source and suspension abstraction.
//!
//! Wait arithmetic reads `now()` from a clock and suspends through
//! `sleep()`, so the same limiter logic runs against tokio timers in
//! production and against a manually advanced clock in tests and
//! simulations.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Source of monotonic time plus a way to suspend the current task.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time with tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Virtual clock that only moves when advanced.
///
/// `sleep` parks the caller until its deadline (`now() + duration`). Once the
/// sleepers settle (a full poll round with no new sleeper registering), time
/// jumps to the earliest pending deadline. Concurrent sleeps therefore
/// overlap: four tasks sleeping one second each advance the clock by one
/// second, not four. Every sleep is recorded for inspection.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
    /// Deadlines of parked sleepers, keyed by sleeper id.
    pending: Vec<(u64, Duration)>,
    next_id: u64,
    /// Bumped whenever a sleeper registers.
    generation: u64,
}

impl ManualState {
    fn earliest_deadline(&self) -> Option<Duration> {
        self.pending.iter().map(|&(_, deadline)| deadline).min()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.lock().offset += duration;
    }

    /// Total virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Non-zero sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Number of sleepers currently parked.
    pub fn pending_sleeps(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<ManualState>) -> MutexGuard<'_, ManualState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters a parked sleeper, including when its future is dropped.
struct Parked<'a> {
    state: &'a Mutex<ManualState>,
    id: u64,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        lock_state(self.state).pending.retain(|&(id, _)| id != self.id);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        let (parked, deadline, mut seen) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.generation += 1;
            let deadline = state.offset + duration;
            state.pending.push((id, deadline));
            state.sleeps.push(duration);
            let parked = Parked {
                state: &self.state,
                id,
            };
            (parked, deadline, state.generation)
        };

        loop {
            tokio::task::yield_now().await;
            let mut state = self.lock();
            if state.offset >= deadline {
                break;
            }
            let settled = state.generation == seen;
            if settled && state.earliest_deadline() == Some(deadline) {
                state.offset = deadline;
                break;
            }
            seen = state.generation;
        }
        drop(parked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_secs(60)).await;
        clock.sleep(Duration::ZERO).await;
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.now() - start, Duration::from_millis(60_500));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
    }

    #[tokio::test]
    async fn test_concurrent_sleeps_overlap() {
        let clock = ManualClock::new();

        let sleepers = (0..4).map(|_| clock.sleep(Duration::from_secs(1)));
        futures::future::join_all(sleepers).await;

        assert_eq!(clock.elapsed(), Duration::from_secs(1));
        assert_eq!(clock.sleeps().len(), 4);
        assert_eq!(clock.pending_sleeps(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sleeps_advance_to_longest() {
        let clock = &ManualClock::new();
        let start = clock.now();

        let finished = futures::future::join_all([3, 1, 2].map(|secs| async move {
            clock.sleep(Duration::from_secs(secs)).await;
            clock.now() - start
        }))
        .await;

        assert_eq!(
            finished,
            vec![
                Duration::from_secs(3),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_cancelled_sleep_does_not_block_others() {
        let clock = ManualClock::new();

        let mut short = clock.sleep(Duration::from_secs(1));
        let long = clock.sleep(Duration::from_secs(10));
        assert!(futures::poll!(&mut short).is_pending());
        assert_eq!(clock.pending_sleeps(), 1);
        drop(short);
        assert_eq!(clock.pending_sleeps(), 0);

        long.await;
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }
}
