//! # Error Handling
//!
//! Queue-level errors and the crate-wide error that unifies every layer.
//!
//! Queue operations never swallow storage failures: each one is wrapped with
//! the operation that failed, so the message reads like
//! `Unable to start task. Queue storage failed to save item.`. A lost
//! optimistic race is reported separately as [`QueueError::SaveConflict`] so
//! callers can tell "someone else got there first" from "storage is down".

use crate::config::ConfigurationError;
use crate::models::QueueItemId;
use crate::orchestration::process_starter::ProcessStarterError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::storage::{QueueStorageError, RunnerStatusStorageError};
use crate::task::TaskError;
use std::fmt;
use thiserror::Error;

/// Queue operations, named for error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperation {
    Enqueue,
    Start,
    Fail,
    Finish,
    Requeue,
    UpdateProgress,
    KeepAlive,
    SaveCheckpoint,
    Find,
    FindRunning,
    FindOldestQueued,
    FindAll,
    FindLatestByType,
}

impl QueueOperation {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue task",
            Self::Start => "start task",
            Self::Fail => "fail task",
            Self::Finish => "finish task",
            Self::Requeue => "requeue task",
            Self::UpdateProgress => "update task progress",
            Self::KeepAlive => "keep task alive",
            Self::SaveCheckpoint => "save task checkpoint",
            Self::Find => "find queue item",
            Self::FindRunning => "find running queue items",
            Self::FindOldestQueued => "find oldest queued items",
            Self::FindAll => "find queue items",
            Self::FindLatestByType => "find latest queue item by type",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Enqueue
                | Self::Start
                | Self::Fail
                | Self::Finish
                | Self::Requeue
                | Self::UpdateProgress
                | Self::KeepAlive
                | Self::SaveCheckpoint
        )
    }

    fn storage_failure(&self) -> &'static str {
        if self.is_write() {
            "Queue storage failed to save item."
        } else {
            "Queue storage failed to fetch items."
        }
    }
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors surfaced by [`Queue`](crate::orchestration::Queue) operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Unable to {operation}. {}", .operation.storage_failure())]
    StorageUnavailable {
        operation: QueueOperation,
        #[source]
        source: QueueStorageError,
    },

    #[error("Unable to {operation}. Queue item {item_id} was changed by another process.")]
    SaveConflict {
        operation: QueueOperation,
        item_id: QueueItemId,
    },

    #[error("Unable to {operation}. Queue item was never saved.")]
    NotPersisted { operation: QueueOperation },

    #[error("Queue item {item_id} not found")]
    NotFound { item_id: QueueItemId },

    #[error("Queue item {item_id} could not be read: {reason}")]
    Corrupted { item_id: QueueItemId, reason: String },

    #[error("Queue item deserialization failed: {0}")]
    Deserialization(#[from] RegistryError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl QueueError {
    /// Attach the failed operation to a storage error
    pub fn from_storage(operation: QueueOperation, error: QueueStorageError) -> Self {
        match error {
            QueueStorageError::SaveConflict { id } => Self::SaveConflict {
                operation,
                item_id: id,
            },
            QueueStorageError::Corrupted { id, reason } => Self::Corrupted {
                item_id: id,
                reason,
            },
            source @ QueueStorageError::Unavailable { .. } => {
                Self::StorageUnavailable { operation, source }
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SaveConflict { .. })
    }

    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Result type for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Crate-wide error
#[derive(Error, Debug)]
pub enum TaskerQueueError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    QueueStorage(#[from] QueueStorageError),

    #[error(transparent)]
    RunnerStatusStorage(#[from] RunnerStatusStorageError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ProcessStarter(#[from] ProcessStarterError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, TaskerQueueError>;
