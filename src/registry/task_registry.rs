//! # Task Registry
//!
//! Maps stable task type names to deserializers producing `Box<dyn Task>`.
//!
//! The registry is backed by a `DashMap`, so it can be shared behind an `Arc`
//! and extended by integrations after the execution services are built.

use crate::task::Task;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

type TaskDeserializer = Arc<dyn Fn(&str) -> Result<Box<dyn Task>, serde_json::Error> + Send + Sync>;

/// Errors raised when a persisted task cannot be rebuilt
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Task type \"{task_type}\" is not registered")]
    UnknownTaskType { task_type: String },

    #[error("Failed to deserialize task of type \"{task_type}\": {source}")]
    Deserialization {
        task_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Registry of task deserializers keyed by task type
#[derive(Default, Clone)]
pub struct TaskRegistry {
    deserializers: Arc<DashMap<String, TaskDeserializer>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type. Re-registering a name replaces the deserializer.
    pub fn register<T>(&self, task_type: impl Into<String>)
    where
        T: Task + DeserializeOwned + 'static,
    {
        let task_type = task_type.into();
        debug!(task_type = %task_type, "Registering task type");

        let deserializer: TaskDeserializer = Arc::new(|serialized: &str| {
            let task: T = serde_json::from_str(serialized)?;
            Ok(Box::new(task) as Box<dyn Task>)
        });
        self.deserializers.insert(task_type, deserializer);
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.deserializers.contains_key(task_type)
    }

    /// Registered task type names, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .deserializers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    /// Rebuild a task from its persisted form
    pub fn deserialize(
        &self,
        task_type: &str,
        serialized_task: &str,
    ) -> Result<Box<dyn Task>, RegistryError> {
        // Clone the handle so the map shard is not locked while deserializing
        let deserializer = self
            .deserializers
            .get(task_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownTaskType {
                task_type: task_type.to_string(),
            })?;

        deserializer(serialized_task).map_err(|source| RegistryError::Deserialization {
            task_type: task_type.to_string(),
            source,
        })
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
