//! # Queue Persistence
//!
//! Storage contracts the scheduler coordinates through, and the
//! implementations shipped with the crate.
//!
//! ## Overview
//!
//! Worker processes share no memory. Everything they agree on lives in two
//! stores:
//!
//! - [`TaskQueueStorage`]: one record per queue item
//! - [`TaskRunnerStatusStorage`]: the singleton task runner status
//!
//! Both support an optimistic write. A queue item save may carry match
//! conditions that the stored row has to satisfy; a runner status write is a
//! compare-and-set against the caller's expected status. A lost race is a
//! conflict error, never a silent no-op, and is distinct from the store being
//! unavailable.
//!
//! ## Implementations
//!
//! - [`memory`]: `parking_lot` guarded maps, for tests and single-process hosts
//! - [`postgres`]: `sqlx` backed tables with conditional `UPDATE`s

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryQueueStorage, InMemoryRunnerStatusStorage};
#[cfg(feature = "postgres")]
pub use postgres::{PgQueueStorage, PgRunnerStatusStorage};

use crate::models::{QueueItem, QueueItemId, QueueItemRecord, TaskRunnerStatus};
use crate::state_machine::{QueueItemStatus, StateMachineError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Queue item storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueStorageError {
    #[error("Queue item {id} does not match the expected stored state")]
    SaveConflict { id: QueueItemId },

    #[error("Queue storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Queue item {id} is corrupted: {reason}")]
    Corrupted { id: QueueItemId, reason: String },
}

impl QueueStorageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted(id: Option<QueueItemId>, error: StateMachineError) -> Self {
        Self::Corrupted {
            id: id.unwrap_or_default(),
            reason: error.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for QueueStorageError {
    fn from(error: sqlx::Error) -> Self {
        Self::unavailable(error.to_string())
    }
}

pub type QueueStorageResult<T> = Result<T, QueueStorageError>;

/// Runner status storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerStatusStorageError {
    #[error("Task runner status changed concurrently, expected guid \"{expected_guid}\"")]
    StatusChangeConflict { expected_guid: String },

    #[error("Task runner status storage unavailable: {reason}")]
    Unavailable { reason: String },
}

impl RunnerStatusStorageError {
    pub fn conflict(expected: &TaskRunnerStatus) -> Self {
        Self::StatusChangeConflict {
            expected_guid: expected.guid().to_string(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RunnerStatusStorageError {
    fn from(error: sqlx::Error) -> Self {
        Self::unavailable(error.to_string())
    }
}

pub type RunnerStatusStorageResult<T> = Result<T, RunnerStatusStorageError>;

/// Field predicate over queue items.
///
/// Used both as a query filter and as the match conditions of a conditional
/// save. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemFilter {
    pub status: Option<QueueItemStatus>,
    pub queue_name: Option<String>,
    pub context: Option<String>,
    pub task_type: Option<String>,
}

impl QueueItemFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: QueueItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = Some(queue_name.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, record: &QueueItemRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
            && self
                .queue_name
                .as_deref()
                .map_or(true, |name| record.queue_name.as_deref() == Some(name))
            && self
                .context
                .as_deref()
                .map_or(true, |context| record.context == context)
            && self
                .task_type
                .as_deref()
                .map_or(true, |task_type| record.task_type == task_type)
    }
}

/// Sortable queue item fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemSortField {
    Id,
    CreateTimestamp,
    QueueTimestamp,
    LastUpdateTimestamp,
    StartTimestamp,
    FinishTimestamp,
    FailTimestamp,
}

impl QueueItemSortField {
    /// Storage column name
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreateTimestamp => "create_timestamp",
            Self::QueueTimestamp => "queue_timestamp",
            Self::LastUpdateTimestamp => "last_update_timestamp",
            Self::StartTimestamp => "start_timestamp",
            Self::FinishTimestamp => "finish_timestamp",
            Self::FailTimestamp => "fail_timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordering for [`TaskQueueStorage::find_all`]. Ties break on ascending id;
/// missing timestamps sort before present ones when ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemSort {
    pub field: QueueItemSortField,
    pub direction: SortDirection,
}

impl QueueItemSort {
    pub fn ascending(field: QueueItemSortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: QueueItemSortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Compare two records under this ordering
    pub fn compare(&self, left: &QueueItemRecord, right: &QueueItemRecord) -> Ordering {
        let ordering = match self.field {
            QueueItemSortField::Id => left.id.cmp(&right.id),
            QueueItemSortField::CreateTimestamp => left.create_timestamp.cmp(&right.create_timestamp),
            QueueItemSortField::QueueTimestamp => left.queue_timestamp.cmp(&right.queue_timestamp),
            QueueItemSortField::LastUpdateTimestamp => {
                left.last_update_timestamp.cmp(&right.last_update_timestamp)
            }
            QueueItemSortField::StartTimestamp => left.start_timestamp.cmp(&right.start_timestamp),
            QueueItemSortField::FinishTimestamp => left.finish_timestamp.cmp(&right.finish_timestamp),
            QueueItemSortField::FailTimestamp => left.fail_timestamp.cmp(&right.fail_timestamp),
        };

        let ordering = match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        ordering.then_with(|| left.id.cmp(&right.id))
    }
}

/// Scheduling fairness policy shared by storage implementations.
///
/// Picks the oldest queued record of every queue that has no `in_progress`
/// record, ordered by ascending queue timestamp and truncated to `limit`.
pub fn select_oldest_queued<'a, I>(records: I, limit: usize) -> Vec<&'a QueueItemRecord>
where
    I: IntoIterator<Item = &'a QueueItemRecord>,
{
    let mut selected = queue_heads(records);
    selected.truncate(limit);
    selected
}

/// [`select_oldest_queued`] without the queues whose oldest record has an
/// earliest start after `now`. The limit applies after those queues are
/// dropped, so delayed heads never take a slot from a ready queue.
pub fn select_startable_queued<'a, I>(
    records: I,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<&'a QueueItemRecord>
where
    I: IntoIterator<Item = &'a QueueItemRecord>,
{
    queue_heads(records)
        .into_iter()
        .filter(|record| record.earliest_start_timestamp.map_or(true, |earliest| earliest <= now))
        .take(limit)
        .collect()
}

fn queue_heads<'a, I>(records: I) -> Vec<&'a QueueItemRecord>
where
    I: IntoIterator<Item = &'a QueueItemRecord>,
{
    let records: Vec<&QueueItemRecord> = records.into_iter().collect();

    let busy_queues: HashSet<&str> = records
        .iter()
        .filter(|record| record.status == QueueItemStatus::InProgress)
        .filter_map(|record| record.queue_name.as_deref())
        .collect();

    let mut oldest: HashMap<&str, &QueueItemRecord> = HashMap::new();
    for record in records
        .iter()
        .copied()
        .filter(|record| record.status == QueueItemStatus::Queued)
    {
        let Some(queue_name) = record.queue_name.as_deref() else {
            continue;
        };
        if busy_queues.contains(queue_name) {
            continue;
        }

        oldest
            .entry(queue_name)
            .and_modify(|current| {
                if queue_order(record, *current) == Ordering::Less {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut selected: Vec<&QueueItemRecord> = oldest.into_values().collect();
    selected.sort_by(|left, right| queue_order(left, right));
    selected
}

fn queue_order(left: &QueueItemRecord, right: &QueueItemRecord) -> Ordering {
    QueueItemSort::ascending(QueueItemSortField::QueueTimestamp).compare(left, right)
}

/// Persistence for queue items
#[async_trait]
pub trait TaskQueueStorage: Send + Sync {
    /// Insert an item without an id, or update a stored one.
    ///
    /// Updates only apply when the stored record matches `conditions`;
    /// otherwise, or when the record is gone, the save fails with
    /// [`QueueStorageError::SaveConflict`]. Returns the item id.
    async fn save(
        &self,
        item: &QueueItem,
        conditions: Option<&QueueItemFilter>,
    ) -> QueueStorageResult<QueueItemId>;

    async fn find(&self, id: QueueItemId) -> QueueStorageResult<Option<QueueItem>>;

    /// See [`select_oldest_queued`]
    async fn find_oldest_queued_items(&self, limit: usize) -> QueueStorageResult<Vec<QueueItem>>;

    /// See [`select_startable_queued`]
    async fn find_startable_queued_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueStorageResult<Vec<QueueItem>>;

    async fn find_all(
        &self,
        filter: &QueueItemFilter,
        sort: Option<QueueItemSort>,
        offset: usize,
        limit: Option<usize>,
    ) -> QueueStorageResult<Vec<QueueItem>>;

    async fn find_running_items(&self) -> QueueStorageResult<Vec<QueueItem>> {
        self.find_all(
            &QueueItemFilter::new().with_status(QueueItemStatus::InProgress),
            Some(QueueItemSort::ascending(QueueItemSortField::Id)),
            0,
            None,
        )
        .await
    }

    /// Most recently queued item of `task_type`, scoped to `context` when given
    async fn find_latest_by_type(
        &self,
        task_type: &str,
        context: Option<&str>,
    ) -> QueueStorageResult<Option<QueueItem>> {
        let mut filter = QueueItemFilter::new().with_task_type(task_type);
        if let Some(context) = context {
            filter = filter.with_context(context);
        }

        let mut items = self
            .find_all(
                &filter,
                Some(QueueItemSort::descending(QueueItemSortField::QueueTimestamp)),
                0,
                Some(1),
            )
            .await?;
        Ok(items.pop())
    }
}

/// Persistence for the singleton task runner status
#[async_trait]
pub trait TaskRunnerStatusStorage: Send + Sync {
    /// Current status, or the null status when none is recorded
    async fn get_status(&self) -> RunnerStatusStorageResult<TaskRunnerStatus>;

    /// Replace the status if the stored one still equals `expected`
    async fn set_status(
        &self,
        expected: &TaskRunnerStatus,
        status: TaskRunnerStatus,
    ) -> RunnerStatusStorageResult<()>;
}
