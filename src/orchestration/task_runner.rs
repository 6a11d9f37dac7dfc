//! # Task Runner
//!
//! One pass of the scheduler, run by whichever process currently owns the
//! runner status:
//!
//! 1. Confirm the runner status still names this runner and is not expired.
//! 2. Reclaim running items that stopped reporting. Items that made progress
//!    since their last attempt are requeued for free; the others are failed,
//!    which consumes a retry.
//! 3. Fill the free execution slots with the oldest queued item of each idle
//!    queue, one [`QueueItemStarter`] per item.
//! 4. Release the runner status, wait the wakeup delay and wake up again, so
//!    the passes continue for as long as there is work.
//!
//! Step 4 happens on every pass, including passes that did nothing because
//! the runner was no longer active.

use crate::config::ExecutionConfig;
use crate::error::TaskerQueueError;
use crate::logging::log_runner_operation;
use crate::models::{QueueItem, QueueItemId, TaskRunnerStatus};
use crate::orchestration::process_starter::AsyncProcessStarter;
use crate::orchestration::queue::Queue;
use crate::orchestration::runner_wakeup::{TaskRunnerWakeup, WakeupOutcome};
use crate::orchestration::starters::{QueueItemStarter, Runnable};
use crate::registry::TaskRegistry;
use crate::storage::TaskRunnerStatusStorage;
use crate::utils::Clock;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Whether a runner pass found itself active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerActivity {
    Active,
    /// Another guid owns the runner status
    NotActive,
    /// This guid owns the status but its alive time ran out
    Expired,
    StatusUnavailable,
}

/// Summary of one runner pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRunnerReport {
    pub activity: RunnerActivity,
    pub requeued: Vec<QueueItemId>,
    pub failed: Vec<QueueItemId>,
    pub dispatched: Vec<QueueItemId>,
    pub deactivated: bool,
    pub wakeup: Option<WakeupOutcome>,
}

impl TaskRunnerReport {
    fn new(activity: RunnerActivity) -> Self {
        Self {
            activity,
            requeued: Vec::new(),
            failed: Vec::new(),
            dispatched: Vec::new(),
            deactivated: false,
            wakeup: None,
        }
    }
}

enum Reclaimed {
    Requeued,
    Failed,
}

pub struct TaskRunner {
    queue: Arc<Queue>,
    registry: TaskRegistry,
    status_storage: Arc<dyn TaskRunnerStatusStorage>,
    process_starter: Arc<dyn AsyncProcessStarter>,
    wakeup: Arc<dyn TaskRunnerWakeup>,
    clock: Arc<dyn Clock>,
    config: ExecutionConfig,
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    pub fn new(
        queue: Arc<Queue>,
        registry: TaskRegistry,
        status_storage: Arc<dyn TaskRunnerStatusStorage>,
        process_starter: Arc<dyn AsyncProcessStarter>,
        wakeup: Arc<dyn TaskRunnerWakeup>,
        clock: Arc<dyn Clock>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            status_storage,
            process_starter,
            wakeup,
            clock,
            config,
        }
    }

    /// Run one pass as the runner identified by `guid`
    #[instrument(skip(self), fields(guid = %guid))]
    pub async fn run(&self, guid: &str) -> TaskRunnerReport {
        let mut report = match self.status_storage.get_status().await {
            Ok(status) => {
                let mut report = TaskRunnerReport::new(self.activity(&status, guid));
                if report.activity == RunnerActivity::Active {
                    self.reclaim_inactive_items(&mut report).await;
                    self.start_queued_items(&mut report).await;
                }
                if status.is_owned_by(guid) {
                    report.deactivated = self.deactivate(&status).await;
                }
                report
            }
            Err(e) => {
                error!(guid = %guid, error = %e, "Runner status storage unavailable.");
                TaskRunnerReport::new(RunnerActivity::StatusUnavailable)
            }
        };

        log_runner_operation(
            "run",
            guid,
            &format!("{:?}", report.activity),
            Some(&format!(
                "requeued={} failed={} dispatched={}",
                report.requeued.len(),
                report.failed.len(),
                report.dispatched.len()
            )),
        );

        self.clock.sleep(self.config.task_runner_wakeup_delay()).await;
        report.wakeup = Some(self.wakeup.wakeup().await);
        report
    }

    fn activity(&self, status: &TaskRunnerStatus, guid: &str) -> RunnerActivity {
        if !status.is_owned_by(guid) {
            info!(
                guid = %guid,
                active_guid = %status.guid(),
                "Task runner started but it is not active anymore."
            );
            RunnerActivity::NotActive
        } else if status.is_expired(self.clock.now(), self.config.task_runner_max_alive_time()) {
            info!(guid = %guid, "Task runner started but it is expired.");
            RunnerActivity::Expired
        } else {
            RunnerActivity::Active
        }
    }

    async fn reclaim_inactive_items(&self, report: &mut TaskRunnerReport) {
        let running = match self.queue.find_running_items().await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to load running queue items");
                return;
            }
        };

        let Some(cutoff) = self
            .clock
            .now()
            .checked_sub_signed(self.config.max_task_inactivity_period())
        else {
            warn!("Inactivity cutoff is out of range, skipping reclaim");
            return;
        };
        for mut item in running {
            if !is_inactive(&item, cutoff) {
                continue;
            }
            let Some(item_id) = item.id() else {
                continue;
            };

            let result = if item.progress_basis_points()
                != item.last_execution_progress_basis_points()
            {
                self.queue
                    .requeue(&mut item)
                    .await
                    .map(|_| Reclaimed::Requeued)
                    .map_err(TaskerQueueError::from)
            } else {
                self.fail_inactive(&mut item, item_id)
                    .await
                    .map(|_| Reclaimed::Failed)
            };

            match result {
                Ok(Reclaimed::Requeued) => report.requeued.push(item_id),
                Ok(Reclaimed::Failed) => report.failed.push(item_id),
                Err(e) => {
                    error!(item_id = item_id, error = %e, "Failed to reclaim inactive queue item")
                }
            }
        }
    }

    async fn fail_inactive(
        &self,
        item: &mut QueueItem,
        item_id: QueueItemId,
    ) -> Result<(), TaskerQueueError> {
        let description = format!(
            "Task {} ({}) failed due to extended inactivity period.",
            item_id,
            item.task_type()
        );

        // The next attempt starts from the reconfigured task
        match item.task(&self.registry) {
            Ok(mut task) => {
                task.reconfigure();
                let serialized = task.serialize_task()?;
                item.store_task_state(task.task_type(), serialized)?;
            }
            Err(e) => {
                warn!(item_id = item_id, error = %e, "Unable to reconfigure inactive task");
            }
        }

        self.queue.fail(item, description).await?;
        Ok(())
    }

    async fn start_queued_items(&self, report: &mut TaskRunnerReport) {
        let running = match self.queue.find_running_items().await {
            Ok(items) => items.len(),
            Err(e) => {
                error!(error = %e, "Failed to load running queue items");
                return;
            }
        };

        let available = (self.config.max_started_tasks_limit as usize).saturating_sub(running);
        if available == 0 {
            debug!(running, "No free task slots");
            return;
        }

        let queued = match self.queue.find_startable_queued_items(available).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to load queued items");
                return;
            }
        };

        let starts = queued
            .iter()
            .filter_map(QueueItem::id)
            .map(|item_id| async move {
                let runnable = Runnable::QueueItem(QueueItemStarter::new(item_id));
                (item_id, self.process_starter.start(runnable).await)
            });

        for (item_id, result) in join_all(starts).await {
            match result {
                Ok(()) => report.dispatched.push(item_id),
                Err(e) => error!(item_id = item_id, error = %e, "Failed to dispatch queue item starter"),
            }
        }
    }

    async fn deactivate(&self, status: &TaskRunnerStatus) -> bool {
        match self
            .status_storage
            .set_status(status, TaskRunnerStatus::null())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(guid = %status.guid(), error = %e, "Failed to deactivate task runner");
                false
            }
        }
    }
}

fn is_inactive(item: &QueueItem, cutoff: DateTime<Utc>) -> bool {
    item.last_update_timestamp()
        .map_or(true, |last_update| last_update < cutoff)
}
