//! # Task Queue Configuration
//!
//! Settings for the scheduler, logging and the optional PostgreSQL backend.
//!
//! ## Sources
//!
//! Loaded by [`ConfigManager`] with the `config` crate, later sources
//! overriding earlier ones:
//!
//! 1. Built-in defaults (the values in [`crate::constants`])
//! 2. `config/tasker-queue.{toml,yaml,json}` (optional)
//! 3. `config/tasker-queue.<environment>.{toml,yaml,json}` (optional)
//! 4. `TASKER_QUEUE__<SECTION>__<FIELD>` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_queue::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let execution = &manager.config().execution;
//! println!("running at most {} tasks", execution.max_started_tasks_limit);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

impl TaskQueueConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        self.execution.validate()?;
        self.database.validate()
    }
}

/// Scheduler limits and timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Queue items allowed in progress at once
    pub max_started_tasks_limit: u32,
    /// Seconds without a progress or alive signal before a running item is reclaimed
    pub max_task_inactivity_period_seconds: u64,
    /// Failed attempts allowed before an item is marked failed
    pub max_task_execution_retries: u32,
    /// Seconds a task runner waits before re-arming the wakeup
    pub task_runner_wakeup_delay_seconds: u64,
    /// Seconds after which a task runner status is expired
    pub task_runner_max_alive_time_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_started_tasks_limit: constants::MAX_STARTED_TASKS_LIMIT,
            max_task_inactivity_period_seconds: constants::MAX_TASK_INACTIVITY_PERIOD_SECONDS,
            max_task_execution_retries: constants::MAX_RETRIES,
            task_runner_wakeup_delay_seconds: constants::TASK_RUNNER_WAKEUP_DELAY_SECONDS,
            task_runner_max_alive_time_seconds: constants::TASK_RUNNER_MAX_ALIVE_TIME_SECONDS,
        }
    }
}

impl ExecutionConfig {
    pub fn max_task_inactivity_period(&self) -> chrono::Duration {
        seconds(self.max_task_inactivity_period_seconds)
    }

    pub fn task_runner_wakeup_delay(&self) -> Duration {
        Duration::from_secs(self.task_runner_wakeup_delay_seconds)
    }

    pub fn task_runner_max_alive_time(&self) -> chrono::Duration {
        seconds(self.task_runner_max_alive_time_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_started_tasks_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_started_tasks_limit",
                self.max_started_tasks_limit,
                "at least one task must be allowed to run",
            ));
        }
        if self.max_task_inactivity_period_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_task_inactivity_period_seconds",
                self.max_task_inactivity_period_seconds,
                "must be positive",
            ));
        }
        if self.max_task_inactivity_period_seconds > constants::MAX_CONFIGURED_PERIOD_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "execution.max_task_inactivity_period_seconds",
                self.max_task_inactivity_period_seconds,
                format!("must not exceed {}", constants::MAX_CONFIGURED_PERIOD_SECONDS),
            ));
        }
        if self.task_runner_max_alive_time_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.task_runner_max_alive_time_seconds",
                self.task_runner_max_alive_time_seconds,
                "must be positive",
            ));
        }
        if self.task_runner_max_alive_time_seconds > constants::MAX_CONFIGURED_PERIOD_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "execution.task_runner_max_alive_time_seconds",
                self.task_runner_max_alive_time_seconds,
                format!("must not exceed {}", constants::MAX_CONFIGURED_PERIOD_SECONDS),
            ));
        }
        if self.task_runner_wakeup_delay_seconds >= self.task_runner_max_alive_time_seconds {
            return Err(ConfigurationError::invalid_value(
                "execution.task_runner_wakeup_delay_seconds",
                self.task_runner_wakeup_delay_seconds,
                format!(
                    "must be shorter than task_runner_max_alive_time_seconds ({})",
                    self.task_runner_max_alive_time_seconds
                ),
            ));
        }
        Ok(())
    }
}

fn seconds(value: u64) -> chrono::Duration {
    let clamped = value.min(constants::MAX_CONFIGURED_PERIOD_SECONDS);
    chrono::Duration::seconds(i64::try_from(clamped).unwrap_or_default())
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; defaults by environment when unset
    pub level: Option<String>,
    pub format: LogFormat,
}

/// PostgreSQL connection settings, used with the `postgres` feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                self.max_connections,
                "pool needs at least one connection",
            ));
        }
        Ok(())
    }

    /// Open a connection pool
    #[cfg(feature = "postgres")]
    pub async fn connect(&self) -> ConfigResult<sqlx::PgPool> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ConfigurationError::missing_required_field("url", "database"))?;

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .connect(url)
            .await
            .map_err(|e| ConfigurationError::invalid_value("database.url", "[redacted]", e.to_string()))
    }
}
