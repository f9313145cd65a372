//! Detection of jobs that sit in one non-terminal status for too long.

use std::time::Duration;

use tokio::time::Instant;

use crate::status::TaskStatus;

/// Whether a job observed in `state` for `time_in_state` should be
/// considered stuck. Terminal states are never stuck.
pub fn is_stuck(state: &TaskStatus, time_in_state: Duration, threshold: Duration) -> bool {
    !state.is_terminal() && time_in_state > threshold
}

/// Tracks the last observed status and when it was first seen.
#[derive(Debug, Clone)]
pub struct StatusClock {
    last: Option<TaskStatus>,
    since: Instant,
}

impl StatusClock {
    /// Start a clock with no observed status; `started_at` counts as
    /// the last change.
    pub fn new(started_at: Instant) -> Self {
        Self {
            last: None,
            since: started_at,
        }
    }

    /// Record an observation and return how long the job has been in
    /// that status. A changed status resets the clock to `now`.
    pub fn observe(&mut self, status: &TaskStatus, now: Instant) -> Duration {
        if self.last.as_ref() != Some(status) {
            self.last = Some(status.clone());
            self.since = now;
            return Duration::ZERO;
        }
        now.saturating_duration_since(self.since)
    }

    pub fn last_observed(&self) -> Option<&TaskStatus> {
        self.last.as_ref()
    }

    pub fn last_changed_at(&self) -> Instant {
        self.since
    }
}
