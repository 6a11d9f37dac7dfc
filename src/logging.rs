//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus helpers that log queue item and
//! task runner operations with a consistent set of structured fields.

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::ENVIRONMENT_VARIABLE;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// `RUST_LOG` wins over the configured level, which wins over the
/// environment default.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level))
        };

        let (pretty, json) = match config.format {
            LogFormat::Pretty => (
                Some(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_filter(filter()),
                ),
                None,
            ),
            LogFormat::Json => (
                None,
                Some(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(true)
                        .with_filter(filter()),
                ),
            ),
        };

        // Another subscriber (e.g. a host application's) may already be installed
        if tracing_subscriber::registry()
            .with(pretty)
            .with(json)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            format = ?config.format,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from `TASKER_ENV`
fn get_environment() -> String {
    std::env::var(ENVIRONMENT_VARIABLE).unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for queue item operations
pub fn log_queue_item_operation(
    operation: &str,
    item_id: Option<i64>,
    task_type: &str,
    queue_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        item_id = item_id,
        task_type = %task_type,
        queue_name = queue_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 QUEUE_ITEM_OPERATION"
    );
}

/// Log structured data for task runner operations
pub fn log_runner_operation(operation: &str, guid: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        guid = %guid,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🏃 RUNNER_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
