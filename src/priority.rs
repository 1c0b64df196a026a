//! Priority tiers shared by the limiter (wait scaling) and the work queue
//! (dequeue order).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// All tiers in dequeue order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Parse a priority label, coercing anything unrecognized to `Normal`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "normal" => Priority::Normal,
            "low" => Priority::Low,
            other => {
                tracing::warn!("Unknown priority '{}', treating as normal", other);
                Priority::Normal
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Scale a computed wait. Zero waits stay zero.
    pub fn scale(&self, wait: Duration) -> Duration {
        if wait.is_zero() {
            return wait;
        }
        let factor = match self {
            Priority::High => 0.5,
            Priority::Normal => return wait,
            Priority::Low => 2.0,
        };
        Duration::try_from_secs_f64(wait.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Position in dequeue order (0 = drained first).
    pub(crate) fn index(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Priority {
    fn from(label: &str) -> Self {
        Priority::from_label(label)
    }
}
