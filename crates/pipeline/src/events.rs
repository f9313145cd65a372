//! Events emitted by the generation manager.
//!
//! Every event names the generation context it belongs to, so a
//! subscriber interested in one context can filter the shared stream.

use printforge_core::job::{JobKind, JobState};
use printforge_core::polling::PollOutcome;
use serde::Serialize;

/// A state change of some generation context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A job was submitted and polling began.
    Started {
        context: String,
        job_id: String,
        kind: JobKind,
    },

    /// A poll cycle completed without ending the session.
    Progress {
        context: String,
        job_id: String,
        state: JobState,
        /// Completion percentage (0-100).
        progress: u8,
        attempt: u32,
    },

    /// The session ended with an outcome.
    Finished {
        context: String,
        job_id: String,
        outcome: PollOutcome,
        /// Human-readable description of the outcome.
        message: String,
    },

    /// The session was cancelled locally, either on request or because
    /// a newer generation replaced it.
    Cancelled { context: String, job_id: String },
}

impl GenerationEvent {
    pub fn context(&self) -> &str {
        match self {
            Self::Started { context, .. }
            | Self::Progress { context, .. }
            | Self::Finished { context, .. }
            | Self::Cancelled { context, .. } => context,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Finished { job_id, .. }
            | Self::Cancelled { job_id, .. } => job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = GenerationEvent::Progress {
            context: "ctx".into(),
            job_id: "t-1".into(),
            state: JobState::Running,
            progress: 40,
            attempt: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["state"], "running");
        assert_eq!(json["progress"], 40);
        assert_eq!(event.context(), "ctx");
    }

    #[test]
    fn finished_embeds_outcome() {
        let event = GenerationEvent::Finished {
            context: "ctx".into(),
            job_id: "t-1".into(),
            outcome: PollOutcome::AttemptsExhausted { attempts: 199 },
            message: PollOutcome::AttemptsExhausted { attempts: 199 }.user_message(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["outcome"]["kind"], "attempts_exhausted");
        assert_eq!(json["outcome"]["attempts"], 199);
        assert_eq!(event.job_id(), "t-1");
    }
}
