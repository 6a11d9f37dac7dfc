//! # Models
//!
//! Persisted values the scheduler works with: queue items and the task
//! runner status.

pub mod queue_item;
pub mod runner_status;

pub use queue_item::{QueueItem, QueueItemId, QueueItemRecord};
pub use runner_status::TaskRunnerStatus;
