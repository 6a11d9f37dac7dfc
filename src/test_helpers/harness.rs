//! A fully wired scheduler over in-memory storages, a manual clock and a
//! recording process starter

use super::doubles::{
    FailingQueueStorage, FailingRunnerStatusStorage, ManualClock, RecordingProcessStarter,
    SequentialGuidProvider,
};
use super::tasks::test_registry;
use crate::config::ExecutionConfig;
use crate::models::QueueItem;
use crate::orchestration::starters::Runnable;
use crate::orchestration::task_runner::TaskRunnerReport;
use crate::orchestration::{Queue, TaskExecutionServices};
use crate::task::Task;
use std::sync::Arc;

pub struct TestHarness {
    pub queue_storage: Arc<FailingQueueStorage>,
    pub status_storage: Arc<FailingRunnerStatusStorage>,
    pub process_starter: Arc<RecordingProcessStarter>,
    pub clock: Arc<ManualClock>,
    pub services: Arc<TaskExecutionServices>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ExecutionConfig::default())
    }

    pub fn with_config(config: ExecutionConfig) -> Self {
        let queue_storage = Arc::new(FailingQueueStorage::new());
        let status_storage = Arc::new(FailingRunnerStatusStorage::new());
        let process_starter = Arc::new(RecordingProcessStarter::new());
        let clock = Arc::new(ManualClock::default());

        let services = TaskExecutionServices::builder(
            queue_storage.clone(),
            status_storage.clone(),
            process_starter.clone(),
        )
        .registry(test_registry())
        .config(config)
        .clock(clock.clone())
        .guid_provider(Arc::new(SequentialGuidProvider::new("runner")))
        .build();

        Self {
            queue_storage,
            status_storage,
            process_starter,
            clock,
            services,
        }
    }

    pub fn queue(&self) -> &Queue {
        self.services.queue()
    }

    /// Enqueue on `queue_name` in the global context
    pub async fn enqueue(&self, queue_name: &str, task: &dyn Task) -> QueueItem {
        self.queue()
            .enqueue(queue_name, task, None)
            .await
            .expect("enqueue should succeed")
    }

    /// Current stored state of an item
    pub async fn reload(&self, item: &QueueItem) -> QueueItem {
        let id = item.id().expect("item should be saved");
        self.queue()
            .find(id)
            .await
            .expect("find should succeed")
            .expect("item should exist")
    }

    /// Run recorded runnables in dispatch order, including the ones they
    /// dispatch, until none are left or `max_steps` have run. Returns the
    /// reports of the task runner passes.
    pub async fn pump(&self, max_steps: usize) -> Vec<TaskRunnerReport> {
        let mut reports = Vec::new();
        let mut pending = std::collections::VecDeque::new();

        for _ in 0..max_steps {
            pending.extend(self.process_starter.take_runnables());
            let Some(runnable) = pending.pop_front() else {
                break;
            };
            match runnable {
                Runnable::TaskRunner(starter) => {
                    if let Some(report) = starter.run(&self.services).await {
                        reports.push(report);
                    }
                }
                Runnable::QueueItem(starter) => starter.run(&self.services).await,
            }
        }
        reports
    }
}
