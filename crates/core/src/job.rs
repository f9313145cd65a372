//! Generation job model and its state machine.
//!
//! A [`Job`] adopts the state reported by the provider verbatim, with
//! two guards: terminal states are absorbing, and a job never moves
//! back from `running` to `queued`.

use serde::{Deserialize, Serialize};

use crate::relay::MaterializedResult;
use crate::status::{StatusRecord, TaskStatus};
use crate::types::{JobId, Timestamp};

/// Which provider pipeline produces the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TextToModel,
    ImageToModel,
}

impl JobKind {
    /// Task type name used by the provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToModel => "text_to_model",
            Self::ImageToModel => "image_to_model",
        }
    }
}

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Map a provider status onto a job state. `None` for statuses
    /// outside the known vocabulary.
    pub fn from_status(status: &TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Queued => Some(Self::Queued),
            TaskStatus::Running => Some(Self::Running),
            TaskStatus::Success => Some(Self::Success),
            TaskStatus::Failed => Some(Self::Failed),
            TaskStatus::Cancelled => Some(Self::Cancelled),
            TaskStatus::Unknown(_) => None,
        }
    }
}

/// Effect of feeding one status record into [`Job::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The job moved to a new state.
    Changed { from: JobState, to: JobState },
    /// Same state as before (progress may still have moved).
    Unchanged,
    /// Provider reported `queued` for a job already running.
    Regressed,
    /// Status string not in the known vocabulary; state untouched.
    Unrecognized(String),
    /// Job was already terminal; the record was dropped.
    Ignored,
}

/// One generation request tracked by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub progress: u8,
    pub created_at: Timestamp,
    /// Client-usable result locations, present only once `state` is `success`.
    pub result: Option<MaterializedResult>,
}

impl Job {
    pub fn new(job_id: impl Into<JobId>, kind: JobKind) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            state: JobState::Queued,
            progress: 0,
            created_at: chrono::Utc::now(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed a fetched status record into the state machine.
    pub fn apply(&mut self, record: &StatusRecord) -> Transition {
        if self.state.is_terminal() {
            return Transition::Ignored;
        }

        let Some(next) = JobState::from_status(&record.status) else {
            tracing::warn!(
                job_id = %self.job_id,
                status = %record.status,
                "Unrecognized provider status, treating as non-terminal",
            );
            return Transition::Unrecognized(record.status.as_str().to_string());
        };

        if self.state == JobState::Running && next == JobState::Queued {
            tracing::debug!(job_id = %self.job_id, "Ignoring running -> queued regression");
            return Transition::Regressed;
        }

        self.progress = match next {
            JobState::Success => 100,
            JobState::Running if self.state == JobState::Running => {
                self.progress.max(record.progress)
            }
            JobState::Running | JobState::Queued => record.progress,
            JobState::Failed | JobState::Cancelled => self.progress,
        };

        let from = self.state;
        self.state = next;
        if from == next {
            Transition::Unchanged
        } else {
            Transition::Changed { from, to: next }
        }
    }

    /// Attach the materialized result. Only valid once, and only in
    /// the `success` state; returns whether the result was stored.
    pub fn complete(&mut self, result: MaterializedResult) -> bool {
        if self.state != JobState::Success || self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }
}
