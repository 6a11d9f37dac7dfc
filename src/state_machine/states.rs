use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue item lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Built in memory, never enqueued
    Created,
    /// Waiting for the task runner to dispatch it
    Queued,
    /// Claimed by a worker and executing
    InProgress,
    /// Task finished successfully
    Completed,
    /// Retries exhausted
    Failed,
}

impl QueueItemStatus {
    /// All states, in lifecycle order.
    pub const ALL: [QueueItemStatus; 5] = [
        Self::Created,
        Self::Queued,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active state (item is being executed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if the item is waiting for dispatch
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Queued)
    }

    /// The snake_case name used in storage and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Default for QueueItemStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!(
                "Invalid QueueItem status: \"{s}\". Status must be one of \"created\", \"queued\", \
                 \"in_progress\", \"completed\" or \"failed\" values."
            )),
        }
    }
}
