//! Time source for the scheduler.
//!
//! All timeouts in the queue are data compared against stored timestamps, so
//! the only live timer is the task runner's wakeup delay, which goes through
//! [`Clock::sleep`] as well. Tests swap in a manual clock.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::time::Duration;

/// Supplies the current time and delays execution
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `chrono` and `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    /// Truncated to microseconds so values survive a round trip through
    /// PostgreSQL `TIMESTAMPTZ` unchanged.
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
