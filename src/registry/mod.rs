//! # Registry Infrastructure
//!
//! Type-name based resolution of persisted tasks.
//!
//! Queue items store a task as its stable type name plus serialized state.
//! The [`TaskRegistry`] maps each type name to a deserializer so the queue can
//! rebuild the concrete task without reflection.

pub mod task_registry;

pub use task_registry::{RegistryError, TaskRegistry};
