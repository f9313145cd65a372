//! Interfaces to the external generation provider.
//!
//! The pipeline only ever talks to the provider through these traits,
//! so tests can drive it with scripted fakes.

use std::fmt;

use async_trait::async_trait;

use crate::status::StatusRecord;
use crate::submission::{SubmissionError, ValidatedSubmission};

/// What went wrong during a status fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// Connection, DNS, TLS or timeout failure.
    Transport,
    /// The provider answered with a non-success HTTP status.
    HttpStatus(u16),
    /// The body could not be decoded.
    Malformed,
    /// The provider reported a business error code.
    Provider { code: i64 },
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::HttpStatus(status) => write!(f, "http {status}"),
            Self::Malformed => f.write_str("malformed response"),
            Self::Provider { code } => write!(f, "provider code {code}"),
        }
    }
}

/// A single failed status fetch. Retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Status fetch failed ({kind}): {detail}")]
pub struct FetchFailed {
    pub kind: FetchFailureKind,
    pub detail: String,
}

impl FetchFailed {
    pub fn new(kind: FetchFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Failure of a non-polling provider call (cancel, list).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Provider call failed: {0}")]
pub struct ProviderError(pub String);

/// One round trip to the provider's "get job status" endpoint.
///
/// Implementations must not retry internally.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusRecord, FetchFailed>;
}

/// Full provider surface used by the generation manager.
#[async_trait]
pub trait GenerationProvider: StatusFetcher {
    /// Create a task and return its job id.
    async fn submit(&self, submission: &ValidatedSubmission) -> Result<String, SubmissionError>;

    /// Ask the provider to cancel a task. Succeeds for tasks that have
    /// already finished.
    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError>;

    /// One page of the account's task history, as the provider reports it.
    async fn list_tasks(&self, page: u32, limit: u32) -> Result<serde_json::Value, ProviderError>;
}
