use serde::{Deserialize, Serialize};

/// Operations that move a queue item through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum QueueItemEvent {
    /// Put a created item on a queue
    Enqueue,
    /// Claim a queued item for execution
    Start,
    /// Record task progress
    ReportProgress,
    /// Record a liveness heartbeat
    ReportAlive,
    /// Mark execution as successful
    Finish,
    /// Put a running item back without penalty
    Requeue,
    /// Record a failed attempt
    Fail {
        /// Whether this attempt exceeded the allowed retries
        retries_exhausted: bool,
    },
}

impl QueueItemEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Start => "start",
            Self::ReportProgress => "report_progress",
            Self::ReportAlive => "report_alive",
            Self::Finish => "finish",
            Self::Requeue => "requeue",
            Self::Fail { .. } => "fail",
        }
    }

    /// Check if this event only reports on a running item
    pub fn is_report(&self) -> bool {
        matches!(self, Self::ReportProgress | Self::ReportAlive)
    }
}
