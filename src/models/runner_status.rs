use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity and liveness of the active task runner.
///
/// The null status (empty guid, no timestamp) means no runner is live.
/// Statuses are compared by value; status storage uses that comparison for
/// its compare-and-set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRunnerStatus {
    guid: String,
    alive_since: Option<DateTime<Utc>>,
}

impl TaskRunnerStatus {
    pub fn new(guid: impl Into<String>, alive_since: DateTime<Utc>) -> Self {
        Self {
            guid: guid.into(),
            alive_since: Some(alive_since),
        }
    }

    /// Rebuild a status from storage columns; an empty guid is the null status
    pub fn from_parts(guid: impl Into<String>, alive_since: Option<DateTime<Utc>>) -> Self {
        let guid = guid.into();
        if guid.is_empty() {
            return Self::null();
        }
        Self { guid, alive_since }
    }

    /// Status meaning "no live runner"
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.guid.is_empty()
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn alive_since(&self) -> Option<DateTime<Utc>> {
        self.alive_since
    }

    /// True when `now - alive_since > max_alive_time`, or when there is no
    /// timestamp at all
    pub fn is_expired(&self, now: DateTime<Utc>, max_alive_time: Duration) -> bool {
        match self.alive_since {
            Some(alive_since) => now - alive_since > max_alive_time,
            None => true,
        }
    }

    /// A non-null status that has not expired
    pub fn is_live(&self, now: DateTime<Utc>, max_alive_time: Duration) -> bool {
        !self.is_null() && !self.is_expired(now, max_alive_time)
    }

    /// Whether `guid` names the runner this status describes
    pub fn is_owned_by(&self, guid: &str) -> bool {
        !self.is_null() && self.guid == guid
    }
}
