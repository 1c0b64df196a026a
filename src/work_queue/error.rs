//! Work queue error types.

use thiserror::Error;

use crate::priority::Priority;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue tier '{tier}' is full (max {max_size} items)")]
    TierFull { tier: Priority, max_size: usize },
}
