//! # System Constants
//!
//! Operational boundaries of the task queue and scheduler. Every value here is
//! a default that [`crate::config::ExecutionConfig`] can override.

/// Maximum number of failed attempts before a queue item is marked failed.
pub const MAX_RETRIES: u32 = 5;

/// Seconds a running item may go without a progress or alive signal before
/// the task runner reclaims it.
pub const MAX_TASK_INACTIVITY_PERIOD_SECONDS: u64 = 30;

/// Maximum number of queue items in progress at the same time.
pub const MAX_STARTED_TASKS_LIMIT: u32 = 8;

/// Seconds after which a task runner status is considered expired.
pub const TASK_RUNNER_MAX_ALIVE_TIME_SECONDS: u64 = 60;

/// Seconds a task runner waits before re-arming the wakeup.
pub const TASK_RUNNER_WAKEUP_DELAY_SECONDS: u64 = 5;

/// Upper bound accepted for any configured period, about one hundred years.
pub const MAX_CONFIGURED_PERIOD_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Queue item progress bounds, in basis points.
pub mod progress {
    /// 0%
    pub const MIN_BASIS_POINTS: u32 = 0;
    /// 100%
    pub const MAX_BASIS_POINTS: u32 = 10_000;
    /// Basis points per percent.
    pub const BASIS_POINTS_PER_PERCENT: f64 = 100.0;
}

/// Storage record names.
pub mod storage {
    /// Name of the singleton runner status record.
    pub const TASK_RUNNER_STATUS_NAME: &str = "task_runner";
    /// Context value meaning "no tenant scope".
    pub const GLOBAL_CONTEXT: &str = "";
}

/// Environment variable used to pick log levels and config overlays.
pub const ENVIRONMENT_VARIABLE: &str = "TASKER_ENV";

/// Prefix for configuration environment overrides.
pub const CONFIG_ENV_PREFIX: &str = "TASKER_QUEUE";
