//! # Task Execution Services
//!
//! Wires the queue, wakeup and task runner together over a pair of storages
//! and a process starter. Runnables receive the finished bundle when they
//! run, which is how a starter deserialized in another task finds its
//! collaborators.
//!
//! ```rust,ignore
//! let (starter, receiver) = ChannelProcessStarter::new();
//! let services = TaskExecutionServices::builder(
//!     Arc::new(InMemoryQueueStorage::new()),
//!     Arc::new(InMemoryRunnerStatusStorage::new()),
//!     Arc::new(starter),
//! )
//! .registry(registry)
//! .build();
//! tokio::spawn(receiver.serve(services.clone()));
//!
//! services.queue().enqueue("mail", &task, None).await?;
//! ```

use crate::config::ExecutionConfig;
use crate::orchestration::process_starter::AsyncProcessStarter;
use crate::orchestration::queue::Queue;
use crate::orchestration::runner_wakeup::{RunnerWakeup, TaskRunnerWakeup};
use crate::orchestration::task_runner::TaskRunner;
use crate::registry::TaskRegistry;
use crate::storage::{TaskQueueStorage, TaskRunnerStatusStorage};
use crate::utils::{Clock, GuidProvider, SystemClock, UuidGuidProvider};
use std::fmt;
use std::sync::Arc;

/// Shared collaborators of a running scheduler
pub struct TaskExecutionServices {
    config: ExecutionConfig,
    registry: TaskRegistry,
    queue: Arc<Queue>,
    task_runner: TaskRunner,
    wakeup: Arc<dyn TaskRunnerWakeup>,
    queue_storage: Arc<dyn TaskQueueStorage>,
    status_storage: Arc<dyn TaskRunnerStatusStorage>,
    process_starter: Arc<dyn AsyncProcessStarter>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TaskExecutionServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutionServices")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl TaskExecutionServices {
    pub fn builder(
        queue_storage: Arc<dyn TaskQueueStorage>,
        status_storage: Arc<dyn TaskRunnerStatusStorage>,
        process_starter: Arc<dyn AsyncProcessStarter>,
    ) -> TaskExecutionServicesBuilder {
        TaskExecutionServicesBuilder::new(queue_storage, status_storage, process_starter)
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn task_runner(&self) -> &TaskRunner {
        &self.task_runner
    }

    pub fn wakeup(&self) -> &Arc<dyn TaskRunnerWakeup> {
        &self.wakeup
    }

    pub fn queue_storage(&self) -> &Arc<dyn TaskQueueStorage> {
        &self.queue_storage
    }

    pub fn status_storage(&self) -> &Arc<dyn TaskRunnerStatusStorage> {
        &self.status_storage
    }

    pub fn process_starter(&self) -> &Arc<dyn AsyncProcessStarter> {
        &self.process_starter
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Builder for [`TaskExecutionServices`]. Defaults to the system clock, UUID
/// runner guids and a [`RunnerWakeup`] over the given storages.
pub struct TaskExecutionServicesBuilder {
    queue_storage: Arc<dyn TaskQueueStorage>,
    status_storage: Arc<dyn TaskRunnerStatusStorage>,
    process_starter: Arc<dyn AsyncProcessStarter>,
    registry: TaskRegistry,
    config: ExecutionConfig,
    clock: Arc<dyn Clock>,
    guid_provider: Arc<dyn GuidProvider>,
    wakeup: Option<Arc<dyn TaskRunnerWakeup>>,
}

impl TaskExecutionServicesBuilder {
    pub fn new(
        queue_storage: Arc<dyn TaskQueueStorage>,
        status_storage: Arc<dyn TaskRunnerStatusStorage>,
        process_starter: Arc<dyn AsyncProcessStarter>,
    ) -> Self {
        Self {
            queue_storage,
            status_storage,
            process_starter,
            registry: TaskRegistry::new(),
            config: ExecutionConfig::default(),
            clock: Arc::new(SystemClock),
            guid_provider: Arc::new(UuidGuidProvider),
            wakeup: None,
        }
    }

    pub fn registry(mut self, registry: TaskRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn guid_provider(mut self, guid_provider: Arc<dyn GuidProvider>) -> Self {
        self.guid_provider = guid_provider;
        self
    }

    /// Replace the wakeup used by the queue and the task runner
    pub fn wakeup(mut self, wakeup: Arc<dyn TaskRunnerWakeup>) -> Self {
        self.wakeup = Some(wakeup);
        self
    }

    pub fn build(self) -> Arc<TaskExecutionServices> {
        let wakeup: Arc<dyn TaskRunnerWakeup> = match self.wakeup {
            Some(wakeup) => wakeup,
            None => Arc::new(RunnerWakeup::new(
                Arc::clone(&self.status_storage),
                Arc::clone(&self.process_starter),
                Arc::clone(&self.guid_provider),
                Arc::clone(&self.clock),
                self.config.task_runner_max_alive_time(),
            )),
        };

        let queue = Arc::new(Queue::new(
            Arc::clone(&self.queue_storage),
            Arc::clone(&wakeup),
            Arc::clone(&self.clock),
            self.config.max_task_execution_retries,
        ));

        let task_runner = TaskRunner::new(
            Arc::clone(&queue),
            self.registry.clone(),
            Arc::clone(&self.status_storage),
            Arc::clone(&self.process_starter),
            Arc::clone(&wakeup),
            Arc::clone(&self.clock),
            self.config.clone(),
        );

        Arc::new(TaskExecutionServices {
            config: self.config,
            registry: self.registry,
            queue,
            task_runner,
            wakeup,
            queue_storage: self.queue_storage,
            status_storage: self.status_storage,
            process_starter: self.process_starter,
            clock: self.clock,
        })
    }
}
