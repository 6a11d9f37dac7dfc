//! # Queue
//!
//! The public face of the scheduler: producers enqueue tasks here, and the
//! task runner and queue item starters drive every later transition through
//! the same type.
//!
//! Each mutation applies the transition to a copy of the item, saves it with a
//! match condition on the status the item had before the transition, and only
//! then commits the change back to the caller's item. Two processes racing on
//! the same item therefore cannot both win: the loser sees
//! [`QueueError::SaveConflict`] and its in-memory item is left untouched.

use crate::constants::storage::GLOBAL_CONTEXT;
use crate::error::{QueueError, QueueOperation, QueueResult};
use crate::logging::log_queue_item_operation;
use crate::models::{QueueItem, QueueItemId};
use crate::orchestration::runner_wakeup::TaskRunnerWakeup;
use crate::state_machine::StateMachineResult;
use crate::storage::{QueueItemFilter, QueueItemSort, TaskQueueStorage};
use crate::task::Task;
use crate::utils::Clock;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Entry point for enqueueing tasks and transitioning queue items
pub struct Queue {
    storage: Arc<dyn TaskQueueStorage>,
    wakeup: Arc<dyn TaskRunnerWakeup>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Queue {
    pub fn new(
        storage: Arc<dyn TaskQueueStorage>,
        wakeup: Arc<dyn TaskRunnerWakeup>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            storage,
            wakeup,
            clock,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Persist `task` as a queued item on `queue_name` and wake the task runner.
    ///
    /// `context` scopes the item for [`Queue::find_latest_by_type`]; `None`
    /// stores it in the global context.
    #[instrument(skip(self, task), fields(queue_name = %queue_name, task_type = %task.task_type()))]
    pub async fn enqueue(
        &self,
        queue_name: &str,
        task: &dyn Task,
        context: Option<&str>,
    ) -> QueueResult<QueueItem> {
        self.enqueue_item(queue_name, task, context, None).await
    }

    /// Like [`Queue::enqueue`], but the task runner will not start the item
    /// before `earliest_start`
    #[instrument(skip(self, task), fields(queue_name = %queue_name, task_type = %task.task_type()))]
    pub async fn enqueue_delayed(
        &self,
        queue_name: &str,
        task: &dyn Task,
        context: Option<&str>,
        earliest_start: DateTime<Utc>,
    ) -> QueueResult<QueueItem> {
        self.enqueue_item(queue_name, task, context, Some(earliest_start))
            .await
    }

    async fn enqueue_item(
        &self,
        queue_name: &str,
        task: &dyn Task,
        context: Option<&str>,
        earliest_start: Option<DateTime<Utc>>,
    ) -> QueueResult<QueueItem> {
        let now = self.clock.now();
        let mut item = QueueItem::new(task, now)?;
        item.set_earliest_start_timestamp(earliest_start);
        item.enqueue(queue_name, context.unwrap_or(GLOBAL_CONTEXT), now)?;

        let id = self.save(&item, None, QueueOperation::Enqueue).await?;
        item.assign_id(id);

        log_queue_item_operation(
            "enqueue",
            item.id(),
            item.task_type(),
            item.queue_name(),
            item.status().as_str(),
            None,
        );

        self.wakeup.wakeup().await;
        Ok(item)
    }

    pub async fn find(&self, id: QueueItemId) -> QueueResult<Option<QueueItem>> {
        self.storage
            .find(id)
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::Find, e))
    }

    pub async fn find_running_items(&self) -> QueueResult<Vec<QueueItem>> {
        self.storage
            .find_running_items()
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::FindRunning, e))
    }

    /// Oldest queued item of each queue with no running item, oldest first
    pub async fn find_oldest_queued_items(&self, limit: usize) -> QueueResult<Vec<QueueItem>> {
        self.storage
            .find_oldest_queued_items(limit)
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::FindOldestQueued, e))
    }

    /// Like [`Queue::find_oldest_queued_items`], minus queues whose oldest
    /// item has an earliest start in the future
    pub async fn find_startable_queued_items(&self, limit: usize) -> QueueResult<Vec<QueueItem>> {
        self.storage
            .find_startable_queued_items(self.clock.now(), limit)
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::FindOldestQueued, e))
    }

    pub async fn find_all(
        &self,
        filter: &QueueItemFilter,
        sort: Option<QueueItemSort>,
        offset: usize,
        limit: Option<usize>,
    ) -> QueueResult<Vec<QueueItem>> {
        self.storage
            .find_all(filter, sort, offset, limit)
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::FindAll, e))
    }

    pub async fn find_latest_by_type(
        &self,
        task_type: &str,
        context: Option<&str>,
    ) -> QueueResult<Option<QueueItem>> {
        self.storage
            .find_latest_by_type(task_type, context)
            .await
            .map_err(|e| QueueError::from_storage(QueueOperation::FindLatestByType, e))
    }

    /// `queued` -> `in_progress`
    pub async fn start(&self, item: &mut QueueItem) -> QueueResult<()> {
        self.apply(item, QueueOperation::Start, |item, now| item.start(now))
            .await?;
        self.log_transition("start", item);
        Ok(())
    }

    /// `in_progress` -> `completed`
    pub async fn finish(&self, item: &mut QueueItem) -> QueueResult<()> {
        self.apply(item, QueueOperation::Finish, |item, now| item.finish(now))
            .await?;
        self.log_transition("finish", item);
        Ok(())
    }

    /// `in_progress` -> `queued` without consuming a retry
    pub async fn requeue(&self, item: &mut QueueItem) -> QueueResult<()> {
        self.apply(item, QueueOperation::Requeue, |item, _| item.requeue())
            .await?;
        self.log_transition("requeue", item);
        Ok(())
    }

    /// Count a failed attempt. The item goes back to `queued` until the
    /// configured retries are used up.
    pub async fn fail(
        &self,
        item: &mut QueueItem,
        failure_description: impl Into<String> + Send,
    ) -> QueueResult<()> {
        let description = failure_description.into();
        let max_retries = self.max_retries;
        self.apply(item, QueueOperation::Fail, move |item, now| {
            item.fail(description, max_retries, now)
        })
        .await?;
        self.log_transition("fail", item);
        Ok(())
    }

    /// Record execution progress in basis points (1/100 of a percent)
    pub async fn update_progress(&self, item: &mut QueueItem, basis_points: u32) -> QueueResult<()> {
        self.apply(item, QueueOperation::UpdateProgress, move |item, now| {
            item.report_progress(basis_points, now)
        })
        .await?;
        debug!(item_id = ?item.id(), basis_points, "Queue item progress updated");
        Ok(())
    }

    /// Refresh the item's last update timestamp
    pub async fn keep_alive(&self, item: &mut QueueItem) -> QueueResult<()> {
        self.apply(item, QueueOperation::KeepAlive, |item, now| {
            item.report_alive(now)
        })
        .await?;
        debug!(item_id = ?item.id(), "Queue item kept alive");
        Ok(())
    }

    /// Persist intermediate task state of a running item. Counts as a sign
    /// of life.
    pub async fn save_checkpoint(
        &self,
        item: &mut QueueItem,
        task_type: &str,
        serialized_task: String,
    ) -> QueueResult<()> {
        self.apply(item, QueueOperation::SaveCheckpoint, move |item, now| {
            item.store_task_state(task_type, serialized_task)?;
            item.report_alive(now)
        })
        .await?;
        debug!(item_id = ?item.id(), "Queue item checkpoint saved");
        Ok(())
    }

    async fn apply<F>(
        &self,
        item: &mut QueueItem,
        operation: QueueOperation,
        transition: F,
    ) -> QueueResult<()>
    where
        F: FnOnce(&mut QueueItem, DateTime<Utc>) -> StateMachineResult<()> + Send,
    {
        if item.id().is_none() {
            return Err(QueueError::NotPersisted { operation });
        }

        let expected = QueueItemFilter::new().with_status(item.status());
        let mut updated = item.clone();
        transition(&mut updated, self.clock.now())?;

        self.save(&updated, Some(&expected), operation).await?;
        *item = updated;
        Ok(())
    }

    async fn save(
        &self,
        item: &QueueItem,
        conditions: Option<&QueueItemFilter>,
        operation: QueueOperation,
    ) -> QueueResult<QueueItemId> {
        self.storage
            .save(item, conditions)
            .await
            .map_err(|e| QueueError::from_storage(operation, e))
    }

    fn log_transition(&self, operation: &str, item: &QueueItem) {
        log_queue_item_operation(
            operation,
            item.id(),
            item.task_type(),
            item.queue_name(),
            item.status().as_str(),
            None,
        );
    }
}
