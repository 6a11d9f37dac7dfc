//! Leaf utilities injected into the scheduler: time and identity.

pub mod clock;
pub mod guid;

pub use clock::{Clock, SystemClock};
pub use guid::{GuidProvider, UuidGuidProvider};
