//! # Test Helpers
//!
//! Shared testing utilities for unit and integration tests: deterministic
//! doubles for the clock, guids, process starter and storages, a set of test
//! tasks, and a fully wired in-memory harness.

pub mod doubles;
pub mod harness;
pub mod tasks;
pub mod test_utils;

pub use doubles::{
    FailingQueueStorage, FailingRunnerStatusStorage, ManualClock, RecordingProcessStarter,
    RecordingWakeup, SequentialGuidProvider,
};
pub use harness::TestHarness;
pub use tasks::{test_registry, BarTask, FailingTask, FooTask};

pub use test_utils::get_test_database_url;
#[cfg(feature = "postgres")]
pub use test_utils::{setup_test_db, MIGRATOR};
