//! # Unit of Work Contract
//!
//! A [`Task`] is the polymorphic unit of work the queue persists and executes.
//! The queue never looks inside a task: it stores the task's serialized state
//! next to its stable type name, rebuilds it through the
//! [`TaskRegistry`](crate::registry::TaskRegistry), and folds the events the
//! task emits through its [`TaskContext`] into queue item updates.
//!
//! ## Events
//!
//! - **Progress**: 0 to 100 percent, carried as basis points (0 to 10000)
//! - **Alive**: heartbeat proving the task is not stuck even without progress
//! - **Checkpoint**: fresh serialized state, persisted so an interrupted
//!   execution resumes from it instead of starting over
//!
//! ## Example
//!
//! ```rust,ignore
//! #[derive(Debug, Serialize, Deserialize)]
//! struct ExportRecipients { offset: usize }
//!
//! #[async_trait]
//! impl Task for ExportRecipients {
//!     fn task_type(&self) -> &str { "export_recipients" }
//!
//!     fn serialize_task(&self) -> Result<String, TaskError> {
//!         Ok(serde_json::to_string(self)?)
//!     }
//!
//!     async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
//!         while self.offset < 1000 {
//!             self.offset += 100;
//!             ctx.report_progress(self.offset as f64 / 10.0)?;
//!             ctx.checkpoint(&*self)?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

mod context;

pub use context::{TaskContext, TaskEvent, TaskEventReceiver};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors raised by tasks and by the task side of event reporting
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task execution failed: {0}")]
    Execution(String),

    #[error("Task serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Progress percentage must be value between 0 and 100.")]
    InvalidProgress { percent: f64 },

    #[error("Task event receiver closed")]
    EventChannelClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution(reason.into())
    }
}

/// A resumable unit of work owned by exactly one queue item
#[async_trait]
pub trait Task: Send + Sync + fmt::Debug {
    /// Stable identifier used to rebuild the task from storage
    fn task_type(&self) -> &str;

    /// Serialize the task's state; the inverse is registered in the task registry
    fn serialize_task(&self) -> Result<String, TaskError>;

    /// Run the task. Any error counts as a failed attempt.
    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError>;

    /// Adjust the task before it is failed for lack of progress.
    fn reconfigure(&mut self) {}
}
