//! # Queue Item Model
//!
//! The persisted envelope around one serialized [`Task`].
//!
//! ## Overview
//!
//! A `QueueItem` carries the task's type name and serialized state together
//! with everything the scheduler needs to decide what runs next: the queue it
//! belongs to, the tenant context it runs under, progress bookkeeping, retry
//! count and the lifecycle timestamps.
//!
//! ## Lifecycle
//!
//! ```text
//! created ──enqueue──▶ queued ──start──▶ in_progress ──finish──▶ completed
//!                        ▲                   │
//!                        └──requeue / fail───┤
//!                                            └──fail (retries exhausted)──▶ failed
//! ```
//!
//! Every transition is resolved through
//! [`determine_target_state`](crate::state_machine::determine_target_state)
//! before any field changes, so a rejected transition leaves the item intact.
//!
//! ## Progress
//!
//! Progress is stored as integer basis points (10000 = 100%). The
//! last-execution progress is the progress snapshot taken when the item was
//! last put back on the queue by the scheduler; comparing the two tells the
//! scheduler whether a stalled item made headway.
//!
//! ## Persistence
//!
//! [`QueueItemRecord`] is the storage-agnostic layout with public fields.
//! Storage implementations persist records; turning a record back into a
//! `QueueItem` validates the progress invariants.

use crate::constants::{progress::BASIS_POINTS_PER_PERCENT, progress::MAX_BASIS_POINTS, storage::GLOBAL_CONTEXT};
use crate::registry::{RegistryError, TaskRegistry};
use crate::state_machine::{
    determine_target_state, QueueItemEvent, QueueItemStatus, StateMachineError, StateMachineResult,
};
use crate::task::{Task, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage-assigned queue item identifier
pub type QueueItemId = i64;

/// Persisted layout of a queue item.
///
/// One record per queue item keyed by `id`. `id` is `None` until the first
/// save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemRecord {
    pub id: Option<QueueItemId>,
    pub status: QueueItemStatus,
    pub queue_name: Option<String>,
    pub context: String,
    pub task_type: String,
    pub serialized_task: String,
    pub progress_basis_points: u32,
    pub last_execution_progress_basis_points: u32,
    pub retries: u32,
    pub failure_description: String,
    pub create_timestamp: DateTime<Utc>,
    pub queue_timestamp: Option<DateTime<Utc>>,
    pub last_update_timestamp: Option<DateTime<Utc>>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub finish_timestamp: Option<DateTime<Utc>>,
    pub fail_timestamp: Option<DateTime<Utc>>,
    pub earliest_start_timestamp: Option<DateTime<Utc>>,
}

impl QueueItemRecord {
    /// A fresh `created` record
    pub fn new(
        task_type: impl Into<String>,
        serialized_task: impl Into<String>,
        create_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            status: QueueItemStatus::Created,
            queue_name: None,
            context: GLOBAL_CONTEXT.to_string(),
            task_type: task_type.into(),
            serialized_task: serialized_task.into(),
            progress_basis_points: 0,
            last_execution_progress_basis_points: 0,
            retries: 0,
            failure_description: String::new(),
            create_timestamp,
            queue_timestamp: None,
            last_update_timestamp: None,
            start_timestamp: None,
            finish_timestamp: None,
            fail_timestamp: None,
            earliest_start_timestamp: None,
        }
    }
}

/// A queue item: a serialized task plus its scheduling state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    record: QueueItemRecord,
}

impl QueueItem {
    /// Wrap a task in a new `created` item
    pub fn new(task: &dyn Task, create_timestamp: DateTime<Utc>) -> Result<Self, TaskError> {
        Ok(Self {
            record: QueueItemRecord::new(
                task.task_type(),
                task.serialize_task()?,
                create_timestamp,
            ),
        })
    }

    /// Rebuild an item from its persisted layout
    pub fn from_record(record: QueueItemRecord) -> StateMachineResult<Self> {
        validate_progress(record.progress_basis_points)?;
        if record.last_execution_progress_basis_points > MAX_BASIS_POINTS {
            return Err(StateMachineError::InvalidLastExecutionProgress {
                basis_points: record.last_execution_progress_basis_points,
            });
        }

        Ok(Self { record })
    }

    pub fn as_record(&self) -> &QueueItemRecord {
        &self.record
    }

    pub fn into_record(self) -> QueueItemRecord {
        self.record
    }

    pub fn id(&self) -> Option<QueueItemId> {
        self.record.id
    }

    /// Record the storage-assigned id. An id, once set, never changes.
    pub(crate) fn assign_id(&mut self, id: QueueItemId) {
        debug_assert!(self.record.id.is_none() || self.record.id == Some(id));
        if self.record.id.is_none() {
            self.record.id = Some(id);
        }
    }

    pub fn status(&self) -> QueueItemStatus {
        self.record.status
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.record.queue_name.as_deref()
    }

    /// Tenant context, empty for the global context
    pub fn context(&self) -> &str {
        &self.record.context
    }

    pub fn task_type(&self) -> &str {
        &self.record.task_type
    }

    pub fn serialized_task(&self) -> &str {
        &self.record.serialized_task
    }

    pub fn progress_basis_points(&self) -> u32 {
        self.record.progress_basis_points
    }

    /// Progress as a percentage with two decimals
    pub fn progress_formatted(&self) -> f64 {
        f64::from(self.record.progress_basis_points) / BASIS_POINTS_PER_PERCENT
    }

    pub fn last_execution_progress_basis_points(&self) -> u32 {
        self.record.last_execution_progress_basis_points
    }

    pub fn last_execution_progress_formatted(&self) -> f64 {
        f64::from(self.record.last_execution_progress_basis_points) / BASIS_POINTS_PER_PERCENT
    }

    pub fn retries(&self) -> u32 {
        self.record.retries
    }

    pub fn failure_description(&self) -> &str {
        &self.record.failure_description
    }

    pub fn create_timestamp(&self) -> DateTime<Utc> {
        self.record.create_timestamp
    }

    pub fn queue_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.queue_timestamp
    }

    pub fn last_update_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.last_update_timestamp
    }

    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.start_timestamp
    }

    pub fn finish_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.finish_timestamp
    }

    pub fn fail_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.fail_timestamp
    }

    pub fn earliest_start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.earliest_start_timestamp
    }

    /// Do not dispatch this item before `timestamp`
    pub fn set_earliest_start_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.record.earliest_start_timestamp = timestamp;
    }

    /// Whether the earliest-start hint allows dispatching at `now`
    pub fn is_startable_at(&self, now: DateTime<Utc>) -> bool {
        self.record
            .earliest_start_timestamp
            .map_or(true, |earliest| earliest <= now)
    }

    /// Overwrite progress without a lifecycle check
    pub fn set_progress_basis_points(&mut self, basis_points: u32) -> StateMachineResult<()> {
        validate_progress(basis_points)?;
        self.record.progress_basis_points = basis_points;
        Ok(())
    }

    /// Overwrite the last-execution progress snapshot without a lifecycle check
    pub fn set_last_execution_progress_basis_points(
        &mut self,
        basis_points: u32,
    ) -> StateMachineResult<()> {
        if basis_points > MAX_BASIS_POINTS {
            return Err(StateMachineError::InvalidLastExecutionProgress { basis_points });
        }
        self.record.last_execution_progress_basis_points = basis_points;
        Ok(())
    }

    /// Rebuild the task this item carries
    pub fn task(&self, registry: &TaskRegistry) -> Result<Box<dyn Task>, RegistryError> {
        registry.deserialize(&self.record.task_type, &self.record.serialized_task)
    }

    /// Replace the serialized task state. The task type cannot change.
    pub fn store_task_state(
        &mut self,
        task_type: &str,
        serialized_task: String,
    ) -> StateMachineResult<()> {
        if task_type != self.record.task_type {
            return Err(StateMachineError::TaskTypeMismatch {
                expected: self.record.task_type.clone(),
                actual: task_type.to_string(),
            });
        }
        self.record.serialized_task = serialized_task;
        Ok(())
    }

    /// `created` -> `queued`
    pub fn enqueue(
        &mut self,
        queue_name: impl Into<String>,
        context: impl Into<String>,
        now: DateTime<Utc>,
    ) -> StateMachineResult<()> {
        let status = self.transition_target(&QueueItemEvent::Enqueue)?;
        self.record.status = status;
        self.record.queue_name = Some(queue_name.into());
        self.record.context = context.into();
        self.record.queue_timestamp = Some(now);
        Ok(())
    }

    /// `queued` -> `in_progress`
    pub fn start(&mut self, now: DateTime<Utc>) -> StateMachineResult<()> {
        let status = self.transition_target(&QueueItemEvent::Start)?;
        self.record.status = status;
        self.record.start_timestamp = Some(now);
        self.record.last_update_timestamp = Some(now);
        Ok(())
    }

    /// Record progress on a running item
    pub fn report_progress(&mut self, basis_points: u32, now: DateTime<Utc>) -> StateMachineResult<()> {
        self.transition_target(&QueueItemEvent::ReportProgress)?;
        validate_progress(basis_points)?;
        self.record.progress_basis_points = basis_points;
        self.record.last_update_timestamp = Some(now);
        Ok(())
    }

    /// Record a liveness heartbeat on a running item
    pub fn report_alive(&mut self, now: DateTime<Utc>) -> StateMachineResult<()> {
        self.transition_target(&QueueItemEvent::ReportAlive)?;
        self.record.last_update_timestamp = Some(now);
        Ok(())
    }

    /// `in_progress` -> `completed`
    pub fn finish(&mut self, now: DateTime<Utc>) -> StateMachineResult<()> {
        let status = self.transition_target(&QueueItemEvent::Finish)?;
        self.record.status = status;
        self.record.progress_basis_points = MAX_BASIS_POINTS;
        self.record.finish_timestamp = Some(now);
        Ok(())
    }

    /// `in_progress` -> `queued` without counting an attempt
    pub fn requeue(&mut self) -> StateMachineResult<()> {
        let status = self.transition_target(&QueueItemEvent::Requeue)?;
        self.record.status = status;
        self.record.last_execution_progress_basis_points = self.record.progress_basis_points;
        self.record.start_timestamp = None;
        Ok(())
    }

    /// Count a failed attempt: back to `queued` while retries remain,
    /// `failed` once `max_retries` is exceeded
    pub fn fail(
        &mut self,
        failure_description: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> StateMachineResult<()> {
        let retries = self.record.retries.saturating_add(1);
        let status = self.transition_target(&QueueItemEvent::Fail {
            retries_exhausted: retries > max_retries,
        })?;

        self.record.status = status;
        self.record.retries = retries;
        self.record.failure_description = failure_description.into();
        if status == QueueItemStatus::Failed {
            self.record.fail_timestamp = Some(now);
        } else {
            self.record.start_timestamp = None;
        }
        Ok(())
    }

    fn transition_target(&self, event: &QueueItemEvent) -> StateMachineResult<QueueItemStatus> {
        determine_target_state(self.record.status, event)
    }
}

fn validate_progress(basis_points: u32) -> StateMachineResult<()> {
    if basis_points > MAX_BASIS_POINTS {
        return Err(StateMachineError::InvalidProgress { basis_points });
    }
    Ok(())
}
