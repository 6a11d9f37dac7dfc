//! In-process storage for queue items and the runner status.
//!
//! Each store keeps its state behind a single `parking_lot::Mutex`, so a
//! conditional save or a status compare-and-set is atomic with respect to
//! every other call on the same instance.

use super::{
    select_oldest_queued, select_startable_queued, QueueItemFilter, QueueItemSort,
    QueueStorageError, QueueStorageResult, RunnerStatusStorageError, RunnerStatusStorageResult,
    TaskQueueStorage, TaskRunnerStatusStorage,
};
use crate::models::{QueueItem, QueueItemId, QueueItemRecord, TaskRunnerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct QueueState {
    last_id: QueueItemId,
    records: BTreeMap<QueueItemId, QueueItemRecord>,
}

/// Queue item storage held in memory
#[derive(Debug, Default)]
pub struct InMemoryQueueStorage {
    state: Mutex<QueueState>,
}

impl InMemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn into_item(record: QueueItemRecord) -> QueueStorageResult<QueueItem> {
    let id = record.id;
    QueueItem::from_record(record).map_err(|error| QueueStorageError::corrupted(id, error))
}

#[async_trait]
impl TaskQueueStorage for InMemoryQueueStorage {
    async fn save(
        &self,
        item: &QueueItem,
        conditions: Option<&QueueItemFilter>,
    ) -> QueueStorageResult<QueueItemId> {
        let mut state = self.state.lock();
        let mut record = item.as_record().clone();

        let id = match record.id {
            Some(id) => {
                let stored = state
                    .records
                    .get(&id)
                    .ok_or(QueueStorageError::SaveConflict { id })?;
                if conditions.is_some_and(|conditions| !conditions.matches(stored)) {
                    return Err(QueueStorageError::SaveConflict { id });
                }
                id
            }
            None => {
                state.last_id += 1;
                record.id = Some(state.last_id);
                state.last_id
            }
        };

        state.records.insert(id, record);
        Ok(id)
    }

    async fn find(&self, id: QueueItemId) -> QueueStorageResult<Option<QueueItem>> {
        let record = self.state.lock().records.get(&id).cloned();
        record.map(into_item).transpose()
    }

    async fn find_oldest_queued_items(&self, limit: usize) -> QueueStorageResult<Vec<QueueItem>> {
        let selected: Vec<QueueItemRecord> = {
            let state = self.state.lock();
            select_oldest_queued(state.records.values(), limit)
                .into_iter()
                .cloned()
                .collect()
        };
        selected.into_iter().map(into_item).collect()
    }

    async fn find_startable_queued_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        let selected: Vec<QueueItemRecord> = {
            let state = self.state.lock();
            select_startable_queued(state.records.values(), now, limit)
                .into_iter()
                .cloned()
                .collect()
        };
        selected.into_iter().map(into_item).collect()
    }

    async fn find_all(
        &self,
        filter: &QueueItemFilter,
        sort: Option<QueueItemSort>,
        offset: usize,
        limit: Option<usize>,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        let mut matching: Vec<QueueItemRecord> = self
            .state
            .lock()
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            matching.sort_by(|left, right| sort.compare(left, right));
        }

        matching
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(into_item)
            .collect()
    }
}

/// Runner status held in memory
#[derive(Debug, Default)]
pub struct InMemoryRunnerStatusStorage {
    status: Mutex<TaskRunnerStatus>,
}

impl InMemoryRunnerStatusStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given status
    pub fn with_status(status: TaskRunnerStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }
}

#[async_trait]
impl TaskRunnerStatusStorage for InMemoryRunnerStatusStorage {
    async fn get_status(&self) -> RunnerStatusStorageResult<TaskRunnerStatus> {
        Ok(self.status.lock().clone())
    }

    async fn set_status(
        &self,
        expected: &TaskRunnerStatus,
        status: TaskRunnerStatus,
    ) -> RunnerStatusStorageResult<()> {
        let mut current = self.status.lock();
        if *current != *expected {
            return Err(RunnerStatusStorageError::conflict(expected));
        }
        *current = status;
        Ok(())
    }
}
