//! Priority-tiered work queue for pending scrape jobs.
//!
//! Three bounded FIFO tiers (high, normal, low) are drained in strict tier
//! order. Dequeued items are tracked as in flight until the dispatcher
//! reports their outcome, which lands in bounded completion/failure buffers.

mod error;
mod item;

pub use error::QueueError;
pub use item::{CompletionRecord, QueueItem, QueuedItem};

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::priority::Priority;

/// Successful completions kept for inspection.
pub const COMPLETED_HISTORY: usize = 1000;

/// Failed completions kept for inspection.
pub const FAILED_HISTORY: usize = 100;

/// Default per-tier capacity.
pub const DEFAULT_MAX_SIZE: usize = 1000;

#[derive(Debug)]
struct Pending<T> {
    item: T,
    queued_at: DateTime<Utc>,
    enqueued: Instant,
}

#[derive(Debug)]
struct QueueState<T> {
    tiers: [VecDeque<Pending<T>>; 3],
    processing: HashSet<String>,
    completed: VecDeque<CompletionRecord>,
    failed: VecDeque<CompletionRecord>,
    total_completed: u64,
    total_failed: u64,
}

impl<T> QueueState<T> {
    fn new() -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            processing: HashSet::new(),
            completed: VecDeque::new(),
            failed: VecDeque::new(),
            total_completed: 0,
            total_failed: 0,
        }
    }
}

/// Snapshot of queue depth and outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub total: usize,
    pub processing: usize,
    /// Successes currently held in the completion buffer.
    pub completed: usize,
    /// Failures currently held in the failure buffer.
    pub failed: usize,
    pub success_rate: f64,
    pub total_completed: u64,
    pub total_failed: u64,
}

/// Bounded three-tier FIFO queue.
#[derive(Debug)]
pub struct RequestQueue<T> {
    max_size: usize,
    state: Mutex<QueueState<T>>,
}

impl<T: QueueItem> RequestQueue<T> {
    /// Create a queue holding at most `max_size` items per tier.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: Mutex::new(QueueState::new()),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append an item to its tier. Fails without enqueuing if the tier is full.
    pub async fn put(&self, item: T, priority: impl Into<Priority>) -> Result<(), QueueError> {
        let priority = priority.into();
        let mut state = self.state.lock().await;
        let tier = &mut state.tiers[priority.index()];

        if tier.len() >= self.max_size {
            return Err(QueueError::TierFull {
                tier: priority,
                max_size: self.max_size,
            });
        }

        debug!("Queued {} ({} priority)", item.queue_id(), priority);
        tier.push_back(Pending {
            item,
            queued_at: Utc::now(),
            enqueued: Instant::now(),
        });
        Ok(())
    }

    /// Take the next item, highest tier first. Returns `None` when empty.
    pub async fn get(&self) -> Option<QueuedItem<T>> {
        let mut state = self.state.lock().await;

        let (priority, pending) = Priority::ALL
            .into_iter()
            .find_map(|p| state.tiers[p.index()].pop_front().map(|e| (p, e)))?;

        state.processing.insert(pending.item.queue_id().to_string());

        let queue_time = pending.enqueued.elapsed();
        debug!(
            "Dequeued {} ({} priority) after {:?}",
            pending.item.queue_id(),
            priority,
            queue_time
        );

        Some(QueuedItem {
            item: pending.item,
            priority,
            queued_at: pending.queued_at,
            dequeued_at: Utc::now(),
            queue_time,
        })
    }

    /// Record the outcome of a dequeued item.
    pub async fn mark_completed(&self, id: &str, success: bool) {
        let mut state = self.state.lock().await;

        if !state.processing.remove(id) {
            debug!("Completion reported for {} which was not in flight", id);
        }

        let record = CompletionRecord {
            id: id.to_string(),
            completed_at: Utc::now(),
            success,
        };

        let (buffer, cap) = if success {
            state.total_completed += 1;
            (&mut state.completed, COMPLETED_HISTORY)
        } else {
            state.total_failed += 1;
            (&mut state.failed, FAILED_HISTORY)
        };
        if buffer.len() >= cap {
            buffer.pop_front();
        }
        buffer.push_back(record);
    }

    /// Items waiting across all tiers.
    pub async fn len(&self) -> usize {
        self.state.lock().await.tiers.iter().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether an item is currently in flight.
    pub async fn is_processing(&self, id: &str) -> bool {
        self.state.lock().await.processing.contains(id)
    }

    /// Most recent successful completions, newest last.
    pub async fn recent_completions(&self, limit: usize) -> Vec<CompletionRecord> {
        let state = self.state.lock().await;
        let skip = state.completed.len().saturating_sub(limit);
        state.completed.iter().skip(skip).cloned().collect()
    }

    /// Most recent failures, newest last.
    pub async fn recent_failures(&self, limit: usize) -> Vec<CompletionRecord> {
        let state = self.state.lock().await;
        let skip = state.failed.len().saturating_sub(limit);
        state.failed.iter().skip(skip).cloned().collect()
    }

    pub async fn get_stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let [high, normal, low] = [0, 1, 2].map(|i| state.tiers[i].len());
        let completed = state.completed.len();
        let failed = state.failed.len();
        let finished = completed + failed;

        QueueStats {
            high,
            normal,
            low,
            total: high + normal + low,
            processing: state.processing.len(),
            completed,
            failed,
            success_rate: if finished == 0 {
                0.0
            } else {
                completed as f64 / finished as f64 * 100.0
            },
            total_completed: state.total_completed,
            total_failed: state.total_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(id: &str) -> String {
        id.to_string()
    }

    #[tokio::test]
    async fn test_full_tier_does_not_affect_others() {
        let queue = RequestQueue::new(2);

        queue.put(s("A"), Priority::High).await.unwrap();
        queue.put(s("B"), Priority::High).await.unwrap();
        let err = queue.put(s("C"), Priority::High).await.unwrap_err();
        assert_eq!(
            err,
            QueueError::TierFull {
                tier: Priority::High,
                max_size: 2
            }
        );
        queue.put(s("D"), Priority::Low).await.unwrap();

        let order: Vec<String> = [
            queue.get().await,
            queue.get().await,
            queue.get().await,
        ]
        .into_iter()
        .map(|q| q.unwrap().item)
        .collect();
        assert_eq!(order, vec!["A", "B", "D"]);
        assert!(queue.get().await.is_none());
    }

    #[tokio::test]
    async fn test_tier_order_and_fifo() {
        let queue = RequestQueue::new(10);

        queue.put(s("low-1"), Priority::Low).await.unwrap();
        queue.put(s("normal-1"), Priority::Normal).await.unwrap();
        queue.put(s("high-1"), Priority::High).await.unwrap();
        queue.put(s("low-2"), Priority::Low).await.unwrap();
        queue.put(s("high-2"), Priority::High).await.unwrap();
        queue.put(s("normal-2"), "bogus").await.unwrap();

        let mut order = Vec::new();
        while let Some(entry) = queue.get().await {
            order.push(entry.item);
        }
        assert_eq!(
            order,
            vec!["high-1", "high-2", "normal-1", "normal-2", "low-1", "low-2"]
        );
    }

    #[tokio::test]
    async fn test_dequeue_stamps_and_tracks_in_flight() {
        let queue = RequestQueue::new(10);
        queue.put(s("job"), Priority::Normal).await.unwrap();

        let entry = queue.get().await.unwrap();
        assert_eq!(entry.priority, Priority::Normal);
        assert!(entry.dequeued_at >= entry.queued_at);
        assert!(queue.is_processing("job").await);
        assert_eq!(queue.get_stats().await.processing, 1);

        queue.mark_completed("job", true).await;
        assert!(!queue.is_processing("job").await);
    }

    #[tokio::test]
    async fn test_completion_buffers_are_bounded() {
        let queue: RequestQueue<String> = RequestQueue::new(10);

        for i in 0..(FAILED_HISTORY + 5) {
            queue.mark_completed(&format!("f{}", i), false).await;
        }
        for i in 0..(COMPLETED_HISTORY + 1) {
            queue.mark_completed(&format!("c{}", i), true).await;
        }

        let stats = queue.get_stats().await;
        assert_eq!(stats.failed, FAILED_HISTORY);
        assert_eq!(stats.completed, COMPLETED_HISTORY);
        assert_eq!(stats.total_failed, (FAILED_HISTORY + 5) as u64);

        let failures = queue.recent_failures(FAILED_HISTORY).await;
        assert_eq!(failures.first().unwrap().id, "f5");
        assert_eq!(failures.last().unwrap().id, format!("f{}", FAILED_HISTORY + 4));

        let completions = queue.recent_completions(1).await;
        assert_eq!(completions[0].id, format!("c{}", COMPLETED_HISTORY));
    }

    #[tokio::test]
    async fn test_stats_success_rate() {
        let queue: RequestQueue<String> = RequestQueue::new(10);
        assert_eq!(queue.get_stats().await.success_rate, 0.0);

        queue.mark_completed("a", true).await;
        queue.mark_completed("b", true).await;
        queue.mark_completed("c", true).await;
        queue.mark_completed("d", false).await;
        assert_eq!(queue.get_stats().await.success_rate, 75.0);

        queue.put(s("x"), Priority::High).await.unwrap();
        queue.put(s("y"), Priority::Low).await.unwrap();
        let stats = queue.get_stats().await;
        assert_eq!((stats.high, stats.normal, stats.low, stats.total), (1, 0, 1, 2));
        assert_eq!(queue.len().await, 2);
    }
}
