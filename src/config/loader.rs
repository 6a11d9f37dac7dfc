//! Configuration Loader
//!
//! Layered loading with the `config` crate: defaults, a base file, an
//! environment overlay file and environment variables.

use super::error::ConfigResult;
use super::TaskQueueConfig;
use crate::constants::{CONFIG_ENV_PREFIX, ENVIRONMENT_VARIABLE};
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "tasker-queue";

/// Loaded, validated configuration plus the environment it was loaded for
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: TaskQueueConfig,
    environment: String,
}

impl ConfigManager {
    /// Load from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Self> {
        Self::load_from_directory(None)
    }

    /// Load from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment, useful in tests
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Self> {
        Self::load_with_env_prefix(config_dir, environment, CONFIG_ENV_PREFIX)
    }

    /// Load with an explicit environment variable prefix
    pub fn load_with_env_prefix(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_prefix: &str,
    ) -> ConfigResult<Self> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading task queue configuration"
        );

        let config: TaskQueueConfig = Config::builder()
            .add_source(File::from(Self::base_file(&config_directory)).required(false))
            .add_source(
                File::from(Self::environment_file(&config_directory, environment)).required(false),
            )
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let manager = Self::from_config(config, environment)?;

        info!(
            environment = %environment,
            max_started_tasks = manager.config.execution.max_started_tasks_limit,
            max_retries = manager.config.execution.max_task_execution_retries,
            "Configuration loaded successfully"
        );
        Ok(manager)
    }

    /// Wrap an already built configuration after validating it
    pub fn from_config(config: TaskQueueConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_string(),
        })
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// `TASKER_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VARIABLE)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    // Extension-less paths: `config` probes every format it supports
    fn base_file(config_directory: &Path) -> PathBuf {
        config_directory.join(CONFIG_FILE_STEM)
    }

    fn environment_file(config_directory: &Path, environment: &str) -> PathBuf {
        config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}"))
    }
}
