//! # Orchestration
//!
//! The scheduler built on top of the storage traits.
//!
//! ## Core Components
//!
//! - **Queue**: enqueues tasks and applies every queue item transition with
//!   optimistic, status-conditioned saves
//! - **RunnerWakeup**: claims the singleton runner status and dispatches a
//!   task runner when none is live
//! - **TaskRunner**: reclaims inactive items, starts the oldest queued item of
//!   each idle queue within the started tasks limit, then re-arms the wakeup
//! - **Starters**: the serializable runnables handed to an async process
//!   starter, one per runner pass and one per queue item execution
//! - **TaskExecutionServices**: wires the components over concrete storages

pub mod process_starter;
pub mod queue;
pub mod runner_wakeup;
pub mod services;
pub mod starters;
pub mod task_runner;

pub use process_starter::{
    AsyncProcessStarter, ChannelProcessStarter, ProcessStarterError, RunnableReceiver,
};
pub use queue::Queue;
pub use runner_wakeup::{RunnerWakeup, TaskRunnerWakeup, WakeupOutcome};
pub use services::{TaskExecutionServices, TaskExecutionServicesBuilder};
pub use starters::{QueueItemStarter, Runnable, TaskRunnerStarter};
pub use task_runner::{RunnerActivity, TaskRunner, TaskRunnerReport};
