//! Queue entries and completion records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::priority::Priority;

/// Anything that can be queued: it must carry a stable identifier so the
/// dispatcher can report completion later.
pub trait QueueItem: Send {
    fn queue_id(&self) -> &str;
}

impl QueueItem for String {
    fn queue_id(&self) -> &str {
        self
    }
}

/// An item taken off the queue, with its timing.
#[derive(Debug, Clone)]
pub struct QueuedItem<T> {
    pub item: T,
    pub priority: Priority,
    pub queued_at: DateTime<Utc>,
    pub dequeued_at: DateTime<Utc>,
    /// Time spent waiting in the queue.
    pub queue_time: Duration,
}

/// Outcome of a dispatched item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    pub id: String,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
}
