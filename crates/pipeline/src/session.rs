//! Poll session state and its read-only snapshot.
//!
//! A [`PollSession`] is mutated only by the poller that owns it. The
//! outside world gets a [`SessionHandle`] (which can only cancel) and
//! [`SessionSnapshot`]s (which can only be read).

use printforge_core::job::Job;
use printforge_core::polling::PollOutcome;
use printforge_core::status::TaskStatus;
use printforge_core::stuck::StatusClock;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Control-loop state for polling one job.
#[derive(Debug)]
pub struct PollSession {
    id: Uuid,
    pub(crate) job: Job,
    pub(crate) attempt_count: u32,
    pub(crate) error_count: u32,
    pub(crate) clock: StatusClock,
    pub(crate) outcome: Option<PollOutcome>,
    cancel: CancellationToken,
}

impl PollSession {
    pub fn new(job: Job, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt_count: 0,
            error_count: 0,
            clock: StatusClock::new(Instant::now()),
            outcome: None,
            cancel,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn last_observed(&self) -> Option<&TaskStatus> {
        self.clock.last_observed()
    }

    pub fn outcome(&self) -> Option<&PollOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Handle the owner keeps to cancel this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            cancel: self.cancel.clone(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            job: self.job.clone(),
            attempt_count: self.attempt_count,
            error_count: self.error_count,
            last_observed_status: self.clock.last_observed().cloned(),
            cancelled: self.cancel.is_cancelled(),
            message: self.outcome.as_ref().map(PollOutcome::user_message),
            outcome: self.outcome.clone(),
        }
    }
}

/// Owner-side handle: the only thing it can do is cancel.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop the session. Takes effect before the next cycle; a pending
    /// re-entry never fires.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Read-only copy of a session, safe to hand to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub job: Job,
    pub attempt_count: u32,
    pub error_count: u32,
    pub last_observed_status: Option<TaskStatus>,
    pub cancelled: bool,
    pub outcome: Option<PollOutcome>,
    /// User-facing message for the outcome, once there is one.
    pub message: Option<String>,
}

impl SessionSnapshot {
    /// Still polling: no outcome yet and not cancelled.
    pub fn is_active(&self) -> bool {
        self.outcome.is_none() && !self.cancelled
    }
}
