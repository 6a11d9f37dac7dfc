//! # Runner Wakeup
//!
//! Makes sure a task runner is working. If the recorded runner status is live
//! nothing happens; otherwise a fresh guid is claimed through a
//! compare-and-set on the status and a task runner starter is dispatched for
//! it. Of several concurrent wakeups only the one whose compare-and-set lands
//! dispatches a runner.

use crate::logging::log_runner_operation;
use crate::models::TaskRunnerStatus;
use crate::orchestration::process_starter::AsyncProcessStarter;
use crate::orchestration::starters::{Runnable, TaskRunnerStarter};
use crate::storage::{RunnerStatusStorageError, TaskRunnerStatusStorage};
use crate::utils::{Clock, GuidProvider};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// What a wakeup call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeupOutcome {
    /// A live runner already holds the status
    AlreadyRunning { guid: String },
    /// A new runner was claimed and its starter dispatched
    Dispatched { guid: String },
    /// Another wakeup changed the status first
    StatusConflict,
    /// The status storage could not be read or written
    StatusUnavailable,
    /// The starter could not be dispatched
    DispatchFailed { guid: String },
}

impl WakeupOutcome {
    pub fn dispatched_guid(&self) -> Option<&str> {
        match self {
            Self::Dispatched { guid } => Some(guid),
            _ => None,
        }
    }
}

/// Something that can wake the task runner
#[async_trait]
pub trait TaskRunnerWakeup: Send + Sync {
    /// Never fails; problems are logged and reported in the outcome
    async fn wakeup(&self) -> WakeupOutcome;
}

/// Wakeup backed by the runner status storage and an async process starter
pub struct RunnerWakeup {
    status_storage: Arc<dyn TaskRunnerStatusStorage>,
    process_starter: Arc<dyn AsyncProcessStarter>,
    guid_provider: Arc<dyn GuidProvider>,
    clock: Arc<dyn Clock>,
    max_alive_time: chrono::Duration,
}

impl fmt::Debug for RunnerWakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerWakeup")
            .field("max_alive_time", &self.max_alive_time)
            .finish_non_exhaustive()
    }
}

impl RunnerWakeup {
    pub fn new(
        status_storage: Arc<dyn TaskRunnerStatusStorage>,
        process_starter: Arc<dyn AsyncProcessStarter>,
        guid_provider: Arc<dyn GuidProvider>,
        clock: Arc<dyn Clock>,
        max_alive_time: chrono::Duration,
    ) -> Self {
        Self {
            status_storage,
            process_starter,
            guid_provider,
            clock,
            max_alive_time,
        }
    }

    async fn claim(&self, current: &TaskRunnerStatus) -> Result<TaskRunnerStatus, WakeupOutcome> {
        let guid = self.guid_provider.new_guid();
        let status = TaskRunnerStatus::new(guid, self.clock.now());

        match self.status_storage.set_status(current, status.clone()).await {
            Ok(()) => Ok(status),
            Err(RunnerStatusStorageError::StatusChangeConflict { expected_guid }) => {
                warn!(
                    expected_guid = %expected_guid,
                    "Runner status storage failed to set new active state."
                );
                Err(WakeupOutcome::StatusConflict)
            }
            Err(e) => {
                error!(error = %e, "Runner status storage unavailable.");
                Err(WakeupOutcome::StatusUnavailable)
            }
        }
    }

    /// Give the claimed status back so the next wakeup does not wait for it
    /// to expire
    async fn release(&self, claimed: &TaskRunnerStatus) {
        if let Err(e) = self
            .status_storage
            .set_status(claimed, TaskRunnerStatus::null())
            .await
        {
            warn!(guid = %claimed.guid(), error = %e, "Failed to release task runner status");
        }
    }
}

#[async_trait]
impl TaskRunnerWakeup for RunnerWakeup {
    #[instrument(skip(self))]
    async fn wakeup(&self) -> WakeupOutcome {
        let current = match self.status_storage.get_status().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Runner status storage unavailable.");
                return WakeupOutcome::StatusUnavailable;
            }
        };

        if current.is_live(self.clock.now(), self.max_alive_time) {
            debug!(guid = %current.guid(), "Task runner already active");
            return WakeupOutcome::AlreadyRunning {
                guid: current.guid().to_string(),
            };
        }

        let claimed = match self.claim(&current).await {
            Ok(status) => status,
            Err(outcome) => return outcome,
        };
        let guid = claimed.guid().to_string();

        let runnable = Runnable::TaskRunner(TaskRunnerStarter::new(guid.clone()));
        match self.process_starter.start(runnable).await {
            Ok(()) => {
                log_runner_operation("wakeup", &guid, "dispatched", None);
                WakeupOutcome::Dispatched { guid }
            }
            Err(e) => {
                error!(guid = %guid, error = %e, "Unexpected error occurred.");
                self.release(&claimed).await;
                WakeupOutcome::DispatchFailed { guid }
            }
        }
    }
}
