use super::{
    errors::{StateMachineError, StateMachineResult},
    events::QueueItemEvent,
    states::QueueItemStatus,
};

/// Determine the target state of a queue item for an event.
///
/// This is the whole transition table; [`crate::models::QueueItem`] applies
/// the side effects once a target is resolved.
pub fn determine_target_state(
    current_state: QueueItemStatus,
    event: &QueueItemEvent,
) -> StateMachineResult<QueueItemStatus> {
    let target = match (current_state, event) {
        (QueueItemStatus::Created, QueueItemEvent::Enqueue) => QueueItemStatus::Queued,
        (QueueItemStatus::Queued, QueueItemEvent::Start) => QueueItemStatus::InProgress,

        // Reports keep the item running
        (QueueItemStatus::InProgress, QueueItemEvent::ReportProgress)
        | (QueueItemStatus::InProgress, QueueItemEvent::ReportAlive) => {
            QueueItemStatus::InProgress
        }
        (status, event) if event.is_report() => {
            return Err(StateMachineError::NotStarted { status });
        }

        (QueueItemStatus::InProgress, QueueItemEvent::Finish) => QueueItemStatus::Completed,
        (QueueItemStatus::InProgress, QueueItemEvent::Requeue) => QueueItemStatus::Queued,
        (
            QueueItemStatus::InProgress,
            QueueItemEvent::Fail {
                retries_exhausted: false,
            },
        ) => QueueItemStatus::Queued,
        (
            QueueItemStatus::InProgress,
            QueueItemEvent::Fail {
                retries_exhausted: true,
            },
        ) => QueueItemStatus::Failed,

        (from, event) => {
            return Err(StateMachineError::illegal_transition(
                from,
                attempted_state(event),
            ))
        }
    };

    Ok(target)
}

/// The state an event tries to reach, used to name illegal transitions.
fn attempted_state(event: &QueueItemEvent) -> QueueItemStatus {
    match event {
        QueueItemEvent::Enqueue | QueueItemEvent::Requeue => QueueItemStatus::Queued,
        QueueItemEvent::Start | QueueItemEvent::ReportProgress | QueueItemEvent::ReportAlive => {
            QueueItemStatus::InProgress
        }
        QueueItemEvent::Finish => QueueItemStatus::Completed,
        QueueItemEvent::Fail { .. } => QueueItemStatus::Failed,
    }
}
