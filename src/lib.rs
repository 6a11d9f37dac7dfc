#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Queue
//!
//! Persistent task queue and scheduler core.
//!
//! ## Overview
//!
//! Producers enqueue serializable [`Task`]s onto named queues. A singleton
//! task runner, kept alive through a runner status record with an expiry,
//! periodically reclaims stalled work and starts queued items in the
//! background. Every piece of state lives in storage, so any number of
//! processes can share a queue: the runner status is claimed with a
//! compare-and-set and queue item transitions are saved only if the item is
//! still in the status they started from.
//!
//! ## Scheduling Rules
//!
//! - Items within one queue run one at a time, oldest first
//! - Different queues run in parallel, up to the started tasks limit
//! - A running item that stops reporting is requeued when it made progress
//!   since its last attempt, and failed otherwise
//! - A failed attempt requeues the item until its retries are used up
//!
//! ## Module Organization
//!
//! - [`models`] - Queue items and the runner status
//! - [`state_machine`] - Queue item statuses and transitions
//! - [`storage`] - Storage traits with in-memory and PostgreSQL backends
//! - [`orchestration`] - Queue, wakeup, starters and the task runner
//! - [`task`] - The task contract and its execution context
//! - [`registry`] - Task type to deserializer mapping
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tasker_queue::orchestration::{ChannelProcessStarter, TaskExecutionServices};
//! use tasker_queue::storage::memory::{InMemoryQueueStorage, InMemoryRunnerStatusStorage};
//! use tasker_queue::TaskRegistry;
//!
//! let registry = TaskRegistry::new();
//! registry.register::<SendNewsletter>("SendNewsletter");
//!
//! let (starter, receiver) = ChannelProcessStarter::new();
//! let services = TaskExecutionServices::builder(
//!     Arc::new(InMemoryQueueStorage::new()),
//!     Arc::new(InMemoryRunnerStatusStorage::new()),
//!     Arc::new(starter),
//! )
//! .registry(registry)
//! .build();
//! tokio::spawn(receiver.serve(services.clone()));
//!
//! services
//!     .queue()
//!     .enqueue("newsletters", &SendNewsletter::new(42), None)
//!     .await?;
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod storage;
pub mod task;
pub mod test_helpers;
pub mod utils;

pub use config::{ConfigManager, ExecutionConfig, TaskQueueConfig};
pub use error::{QueueError, QueueOperation, QueueResult, Result, TaskerQueueError};
pub use models::{QueueItem, QueueItemId, QueueItemRecord, TaskRunnerStatus};
pub use orchestration::{
    AsyncProcessStarter, ChannelProcessStarter, Queue, QueueItemStarter, Runnable, RunnerWakeup,
    TaskExecutionServices, TaskRunner, TaskRunnerStarter, TaskRunnerWakeup,
};
pub use registry::{RegistryError, TaskRegistry};
pub use state_machine::{QueueItemStatus, StateMachineError};
pub use storage::{TaskQueueStorage, TaskRunnerStatusStorage};
pub use task::{Task, TaskContext, TaskError};
pub use utils::{Clock, GuidProvider, SystemClock, UuidGuidProvider};
