// Queue item state machine
//
// The lifecycle of a queue item is a small closed table of transitions; every
// mutation of a persisted item goes through `determine_target_state` first.

pub mod errors;
pub mod events;
pub mod queue_item_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::QueueItemEvent;
pub use queue_item_state_machine::determine_target_state;
pub use states::QueueItemStatus;
