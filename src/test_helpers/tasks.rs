//! Task implementations used across the test suites

use crate::registry::TaskRegistry;
use crate::task::{Task, TaskContext, TaskError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const FOO_TASK_TYPE: &str = "FooTask";
pub const BAR_TASK_TYPE: &str = "BarTask";
pub const FAILING_TASK_TYPE: &str = "FailingTask";

/// Counts its executions and reconfigurations, reporting `progress_steps`
/// (percent) while it runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FooTask {
    pub label: String,
    pub executions: u32,
    pub reconfigured: u32,
    pub progress_steps: Vec<f64>,
}

impl FooTask {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_progress_steps(mut self, steps: Vec<f64>) -> Self {
        self.progress_steps = steps;
        self
    }
}

#[async_trait]
impl Task for FooTask {
    fn task_type(&self) -> &str {
        FOO_TASK_TYPE
    }

    fn serialize_task(&self) -> Result<String, TaskError> {
        Ok(serde_json::to_string(self)?)
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.executions += 1;
        for percent in &self.progress_steps {
            ctx.report_progress(*percent)?;
        }
        ctx.report_alive()?;
        ctx.checkpoint(&*self)?;
        Ok(())
    }

    fn reconfigure(&mut self) {
        self.reconfigured += 1;
    }
}

/// Records the execution context it ran with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarTask {
    pub seen_context: Option<String>,
}

#[async_trait]
impl Task for BarTask {
    fn task_type(&self) -> &str {
        BAR_TASK_TYPE
    }

    fn serialize_task(&self) -> Result<String, TaskError> {
        Ok(serde_json::to_string(self)?)
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.seen_context = Some(ctx.execution_context().to_string());
        Ok(())
    }
}

/// Reports some progress and then fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailingTask {
    pub reason: String,
}

impl FailingTask {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Task for FailingTask {
    fn task_type(&self) -> &str {
        FAILING_TASK_TYPE
    }

    fn serialize_task(&self) -> Result<String, TaskError> {
        Ok(serde_json::to_string(self)?)
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.report_progress(25.0)?;
        Err(TaskError::execution(self.reason.clone()))
    }
}

/// Registry with every test task registered
pub fn test_registry() -> TaskRegistry {
    let registry = TaskRegistry::new();
    registry.register::<FooTask>(FOO_TASK_TYPE);
    registry.register::<BarTask>(BAR_TASK_TYPE);
    registry.register::<FailingTask>(FAILING_TASK_TYPE);
    registry
}
