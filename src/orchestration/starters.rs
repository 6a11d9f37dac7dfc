//! # Starters
//!
//! The two units of work the scheduler hands to an
//! [`AsyncProcessStarter`](crate::orchestration::AsyncProcessStarter):
//!
//! - [`TaskRunnerStarter`] runs one task runner pass for a claimed guid
//! - [`QueueItemStarter`] executes the task of one queued item
//!
//! Both carry only identifiers, so they serialize to small JSON payloads and
//! resolve everything else through [`TaskExecutionServices`] when they run.
//! Neither returns an error: failures are logged with the identifier and
//! recovery is left to the task runner's inactivity sweep.

use crate::error::{QueueError, TaskerQueueError};
use crate::models::{QueueItem, QueueItemId};
use crate::orchestration::queue::Queue;
use crate::orchestration::services::TaskExecutionServices;
use crate::orchestration::task_runner::TaskRunnerReport;
use crate::task::{TaskContext, TaskEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// A unit of work an async process starter can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Runnable {
    TaskRunner(TaskRunnerStarter),
    QueueItem(QueueItemStarter),
}

impl Runnable {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub async fn run(&self, services: &TaskExecutionServices) {
        match self {
            Self::TaskRunner(starter) => {
                starter.run(services).await;
            }
            Self::QueueItem(starter) => starter.run(services).await,
        }
    }
}

/// Runs a task runner pass if `guid` still owns a live runner status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRunnerStarter {
    guid: String,
}

impl TaskRunnerStarter {
    pub fn new(guid: impl Into<String>) -> Self {
        Self { guid: guid.into() }
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Returns the runner's report, or `None` when the runner was not started
    #[instrument(skip(self, services), fields(guid = %self.guid))]
    pub async fn run(&self, services: &TaskExecutionServices) -> Option<TaskRunnerReport> {
        let status = match services.status_storage().get_status().await {
            Ok(status) => status,
            Err(e) => {
                error!(
                    guid = %self.guid,
                    error = %e,
                    "Failed to run task runner. Runner status storage unavailable."
                );
                return None;
            }
        };

        if !status.is_owned_by(&self.guid) {
            error!(
                guid = %self.guid,
                active_guid = %status.guid(),
                "Failed to run task runner. Runner guid is not set as active."
            );
            return None;
        }

        let max_alive_time = services.config().task_runner_max_alive_time();
        if status.is_expired(services.clock().now(), max_alive_time) {
            error!(guid = %self.guid, "Failed to run task runner. Runner is expired.");
            return None;
        }

        Some(services.task_runner().run(&self.guid).await)
    }
}

/// Executes the task of one queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemStarter {
    queue_item_id: QueueItemId,
}

impl QueueItemStarter {
    pub fn new(queue_item_id: QueueItemId) -> Self {
        Self { queue_item_id }
    }

    pub fn queue_item_id(&self) -> QueueItemId {
        self.queue_item_id
    }

    #[instrument(skip(self, services), fields(item_id = self.queue_item_id))]
    pub async fn run(&self, services: &TaskExecutionServices) {
        match self.execute(services).await {
            Ok(()) => {}
            Err(TaskerQueueError::Task(e)) => {
                error!(item_id = self.queue_item_id, error = %e, "Task execution failed.");
            }
            Err(e) => {
                error!(item_id = self.queue_item_id, error = %e, "Fail to start task execution.");
            }
        }
    }

    async fn execute(&self, services: &TaskExecutionServices) -> Result<(), TaskerQueueError> {
        let queue = services.queue();
        let mut item = queue
            .find(self.queue_item_id)
            .await?
            .ok_or(QueueError::NotFound {
                item_id: self.queue_item_id,
            })?;
        queue.start(&mut item).await?;

        // An undecodable task fails the attempt like any other start failure
        let mut task = match item.task(services.registry()) {
            Ok(task) => task,
            Err(e) => {
                let description = format!(
                    "Task {} ({}) could not be deserialized: {}",
                    self.queue_item_id,
                    item.task_type(),
                    e
                );
                queue.fail(&mut item, description).await?;
                return Err(e.into());
            }
        };
        info!(
            item_id = self.queue_item_id,
            task_type = %item.task_type(),
            "Task execution started"
        );

        let (ctx, mut events) = TaskContext::new(item.context());
        let result = {
            let mut execution = task.execute(&ctx);
            loop {
                tokio::select! {
                    result = &mut execution => break result,
                    Some(event) = events.recv() => apply_event(queue, &mut item, event).await?,
                }
            }
        };
        while let Ok(event) = events.try_recv() {
            apply_event(queue, &mut item, event).await?;
        }
        result?;

        item.store_task_state(task.task_type(), task.serialize_task()?)?;
        queue.finish(&mut item).await?;
        info!(item_id = self.queue_item_id, "Task execution finished");
        Ok(())
    }
}

async fn apply_event(queue: &Queue, item: &mut QueueItem, event: TaskEvent) -> Result<(), QueueError> {
    match event {
        TaskEvent::ProgressReported { basis_points } => {
            queue.update_progress(item, basis_points).await
        }
        TaskEvent::AliveAnnounced => queue.keep_alive(item).await,
        TaskEvent::Checkpoint {
            task_type,
            serialized_task,
        } => {
            debug!(item_id = ?item.id(), "Task checkpoint received");
            queue
                .save_checkpoint(item, &task_type, serialized_task)
                .await
        }
    }
}
