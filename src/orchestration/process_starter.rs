//! # Async Process Starter
//!
//! Hands a [`Runnable`] off for execution outside the caller's flow. Runnables
//! cross the boundary as JSON so a starter can put them on any transport; the
//! bundled [`ChannelProcessStarter`] uses an in-process channel drained by a
//! [`RunnableReceiver`] that spawns one tokio task per runnable.

use crate::logging::log_error;
use crate::orchestration::services::TaskExecutionServices;
use crate::orchestration::starters::Runnable;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProcessStarterError {
    #[error("Failed to serialize runnable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runnable dispatcher is closed")]
    DispatcherClosed,

    #[error("Failed to dispatch runnable: {0}")]
    Dispatch(String),
}

/// Starts runnables asynchronously
#[async_trait]
pub trait AsyncProcessStarter: Send + Sync {
    /// Returns once the runnable is handed off, not when it finishes
    async fn start(&self, runnable: Runnable) -> Result<(), ProcessStarterError>;
}

/// Process starter backed by an unbounded channel of serialized runnables
#[derive(Debug, Clone)]
pub struct ChannelProcessStarter {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelProcessStarter {
    pub fn new() -> (Self, RunnableReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, RunnableReceiver { receiver })
    }
}

#[async_trait]
impl AsyncProcessStarter for ChannelProcessStarter {
    async fn start(&self, runnable: Runnable) -> Result<(), ProcessStarterError> {
        let payload = runnable.to_json()?;
        self.sender
            .send(payload)
            .map_err(|_| ProcessStarterError::DispatcherClosed)
    }
}

/// Receiving half of a [`ChannelProcessStarter`]
#[derive(Debug)]
pub struct RunnableReceiver {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl RunnableReceiver {
    /// Next pending runnable without waiting
    pub fn try_next(&mut self) -> Option<Result<Runnable, ProcessStarterError>> {
        self.receiver
            .try_recv()
            .ok()
            .map(|payload| Runnable::from_json(&payload).map_err(ProcessStarterError::from))
    }

    /// Run every received runnable on its own tokio task.
    ///
    /// Returns when every sender is dropped. The services usually hold a
    /// sender themselves, so this is meant to be spawned.
    pub async fn serve(mut self, services: Arc<TaskExecutionServices>) {
        info!("Runnable dispatcher started");
        while let Some(payload) = self.receiver.recv().await {
            match Runnable::from_json(&payload) {
                Ok(runnable) => {
                    debug!(runnable = %payload, "Dispatching runnable");
                    let services = Arc::clone(&services);
                    tokio::spawn(async move {
                        runnable.run(&services).await;
                    });
                }
                Err(e) => log_error(
                    "process_starter",
                    "decode_runnable",
                    &e.to_string(),
                    Some(&payload),
                ),
            }
        }
        info!("Runnable dispatcher stopped");
    }
}
