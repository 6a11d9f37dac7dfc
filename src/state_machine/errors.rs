use super::states::QueueItemStatus;
use thiserror::Error;

/// Errors raised by queue item state and progress bookkeeping
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Illegal queue item state transition from \"{from}\" to \"{to}\"")]
    IllegalTransition {
        from: QueueItemStatus,
        to: QueueItemStatus,
    },

    #[error("Progress reported for not started queue item.")]
    NotStarted { status: QueueItemStatus },

    #[error("Progress percentage must be value between 0 and 100.")]
    InvalidProgress { basis_points: u32 },

    #[error("Last execution progress percentage must be value between 0 and 100.")]
    InvalidLastExecutionProgress { basis_points: u32 },

    #[error("{0}")]
    InvalidStatus(String),

    #[error("Queue item task type is {expected}, got {actual}")]
    TaskTypeMismatch { expected: String, actual: String },
}

impl StateMachineError {
    pub fn illegal_transition(from: QueueItemStatus, to: QueueItemStatus) -> Self {
        Self::IllegalTransition { from, to }
    }

    /// Whether the error signals a programming mistake rather than bad data
    pub fn is_transition_error(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. } | Self::NotStarted { .. })
    }
}

/// Result type for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
