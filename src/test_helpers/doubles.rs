//! Deterministic stand-ins for the scheduler's collaborators

use crate::models::{QueueItem, QueueItemId, TaskRunnerStatus};
use crate::orchestration::process_starter::{AsyncProcessStarter, ProcessStarterError};
use crate::orchestration::runner_wakeup::{TaskRunnerWakeup, WakeupOutcome};
use crate::orchestration::starters::Runnable;
use crate::storage::memory::{InMemoryQueueStorage, InMemoryRunnerStatusStorage};
use crate::storage::{
    QueueItemFilter, QueueItemSort, QueueStorageError, QueueStorageResult,
    RunnerStatusStorageError, RunnerStatusStorageResult, TaskQueueStorage,
    TaskRunnerStatusStorage,
};
use crate::utils::{Clock, GuidProvider};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Clock that only moves when told to. Sleeping advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Every duration passed to [`Clock::sleep`] so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        if let Ok(by) = chrono::Duration::from_std(duration) {
            self.advance(by);
        }
        tokio::task::yield_now().await;
    }
}

/// Guids of the form `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequentialGuidProvider {
    prefix: String,
    next: AtomicU64,
}

impl SequentialGuidProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl GuidProvider for SequentialGuidProvider {
    fn new_guid(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

/// Keeps dispatched runnables for the test to run by hand
#[derive(Debug, Default)]
pub struct RecordingProcessStarter {
    runnables: Mutex<Vec<Runnable>>,
    failing: AtomicBool,
}

impl RecordingProcessStarter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn runnables(&self) -> Vec<Runnable> {
        self.runnables.lock().clone()
    }

    /// Drain the recorded runnables
    pub fn take_runnables(&self) -> Vec<Runnable> {
        std::mem::take(&mut *self.runnables.lock())
    }

    pub fn queue_item_ids(&self) -> Vec<QueueItemId> {
        self.runnables
            .lock()
            .iter()
            .filter_map(|runnable| match runnable {
                Runnable::QueueItem(starter) => Some(starter.queue_item_id()),
                Runnable::TaskRunner(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl AsyncProcessStarter for RecordingProcessStarter {
    async fn start(&self, runnable: Runnable) -> Result<(), ProcessStarterError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProcessStarterError::Dispatch("process starter offline".to_string()));
        }
        // Same boundary a real starter crosses
        let runnable = Runnable::from_json(&runnable.to_json()?)?;
        self.runnables.lock().push(runnable);
        Ok(())
    }
}

/// Counts wakeups without touching any storage
#[derive(Debug, Default)]
pub struct RecordingWakeup {
    calls: AtomicUsize,
}

impl RecordingWakeup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunnerWakeup for RecordingWakeup {
    async fn wakeup(&self) -> WakeupOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        WakeupOutcome::AlreadyRunning {
            guid: String::new(),
        }
    }
}

/// In-memory queue storage that can be switched into failure modes
#[derive(Debug, Default)]
pub struct FailingQueueStorage {
    inner: InMemoryQueueStorage,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
    conflict_saves: AtomicBool,
}

impl FailingQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryQueueStorage {
        &self.inner
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_conflict_saves(&self, conflict: bool) {
        self.conflict_saves.store(conflict, Ordering::SeqCst);
    }

    fn check_read(&self) -> QueueStorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(QueueStorageError::unavailable("read failure injected"));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueueStorage for FailingQueueStorage {
    async fn save(
        &self,
        item: &QueueItem,
        conditions: Option<&QueueItemFilter>,
    ) -> QueueStorageResult<QueueItemId> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(QueueStorageError::unavailable("save failure injected"));
        }
        if self.conflict_saves.load(Ordering::SeqCst) {
            if let Some(id) = item.id() {
                return Err(QueueStorageError::SaveConflict { id });
            }
        }
        self.inner.save(item, conditions).await
    }

    async fn find(&self, id: QueueItemId) -> QueueStorageResult<Option<QueueItem>> {
        self.check_read()?;
        self.inner.find(id).await
    }

    async fn find_oldest_queued_items(&self, limit: usize) -> QueueStorageResult<Vec<QueueItem>> {
        self.check_read()?;
        self.inner.find_oldest_queued_items(limit).await
    }

    async fn find_startable_queued_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        self.check_read()?;
        self.inner.find_startable_queued_items(now, limit).await
    }

    async fn find_all(
        &self,
        filter: &QueueItemFilter,
        sort: Option<QueueItemSort>,
        offset: usize,
        limit: Option<usize>,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        self.check_read()?;
        self.inner.find_all(filter, sort, offset, limit).await
    }
}

/// In-memory runner status storage that can be switched into failure modes
#[derive(Debug, Default)]
pub struct FailingRunnerStatusStorage {
    inner: InMemoryRunnerStatusStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    conflict_writes: AtomicBool,
}

impl FailingRunnerStatusStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: TaskRunnerStatus) -> Self {
        Self {
            inner: InMemoryRunnerStatusStorage::with_status(status),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_conflict_writes(&self, conflict: bool) {
        self.conflict_writes.store(conflict, Ordering::SeqCst);
    }

    /// Overwrite the stored status, bypassing the compare-and-set
    pub async fn force_status(&self, status: TaskRunnerStatus) {
        let current = self.inner.get_status().await.unwrap_or_default();
        let _ = self.inner.set_status(&current, status).await;
    }
}

#[async_trait]
impl TaskRunnerStatusStorage for FailingRunnerStatusStorage {
    async fn get_status(&self) -> RunnerStatusStorageResult<TaskRunnerStatus> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RunnerStatusStorageError::unavailable("read failure injected"));
        }
        self.inner.get_status().await
    }

    async fn set_status(
        &self,
        expected: &TaskRunnerStatus,
        status: TaskRunnerStatus,
    ) -> RunnerStatusStorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RunnerStatusStorageError::unavailable("write failure injected"));
        }
        if self.conflict_writes.load(Ordering::SeqCst) {
            return Err(RunnerStatusStorageError::conflict(expected));
        }
        self.inner.set_status(expected, status).await
    }
}
