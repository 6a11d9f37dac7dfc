use super::{Task, TaskError};
use crate::constants::progress::{BASIS_POINTS_PER_PERCENT, MAX_BASIS_POINTS};
use tokio::sync::mpsc;

/// Events a task emits while executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    ProgressReported { basis_points: u32 },
    AliveAnnounced,
    Checkpoint {
        task_type: String,
        serialized_task: String,
    },
}

/// Receiving half of a task's event channel
pub type TaskEventReceiver = mpsc::UnboundedReceiver<TaskEvent>;

/// Execution context handed to [`Task::execute`].
///
/// Carries the tenant context the item was enqueued under and the sending
/// half of the event channel the queue item starter listens on.
#[derive(Debug, Clone)]
pub struct TaskContext {
    execution_context: String,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskContext {
    /// Create a context and the receiver for its events
    pub fn new(execution_context: impl Into<String>) -> (Self, TaskEventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                execution_context: execution_context.into(),
                events,
            },
            receiver,
        )
    }

    /// Tenant context of the queue item being executed
    pub fn execution_context(&self) -> &str {
        &self.execution_context
    }

    /// Report progress as a percentage with up to two decimals
    pub fn report_progress(&self, percent: f64) -> Result<(), TaskError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(TaskError::InvalidProgress { percent });
        }

        let basis_points = (percent * BASIS_POINTS_PER_PERCENT).round() as u32;
        self.report_progress_basis_points(basis_points)
    }

    pub fn report_progress_basis_points(&self, basis_points: u32) -> Result<(), TaskError> {
        if basis_points > MAX_BASIS_POINTS {
            return Err(TaskError::InvalidProgress {
                percent: f64::from(basis_points) / BASIS_POINTS_PER_PERCENT,
            });
        }

        self.send(TaskEvent::ProgressReported { basis_points })
    }

    pub fn report_alive(&self) -> Result<(), TaskError> {
        self.send(TaskEvent::AliveAnnounced)
    }

    /// Persist the task's current state so a later execution resumes from it
    pub fn checkpoint(&self, task: &dyn Task) -> Result<(), TaskError> {
        self.send(TaskEvent::Checkpoint {
            task_type: task.task_type().to_string(),
            serialized_task: task.serialize_task()?,
        })
    }

    fn send(&self, event: TaskEvent) -> Result<(), TaskError> {
        self.events
            .send(event)
            .map_err(|_| TaskError::EventChannelClosed)
    }
}
