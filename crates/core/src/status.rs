//! Provider task status vocabulary and the normalized status record.
//!
//! The provider reports status as a free-form string. Known values map
//! onto [`TaskStatus`] variants; anything else is preserved verbatim in
//! [`TaskStatus::Unknown`] so that a vocabulary change upstream never
//! breaks deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Status string reported by the provider for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
    /// A status string outside the known vocabulary, kept as reported.
    Unknown(String),
}

impl TaskStatus {
    /// Parse a raw provider status. Never fails.
    pub fn parse(raw: &str) -> Self {
        match raw {
            STATUS_QUEUED => Self::Queued,
            STATUS_RUNNING => Self::Running,
            STATUS_SUCCESS => Self::Success,
            STATUS_FAILED => Self::Failed,
            STATUS_CANCELLED => Self::Cancelled,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The status string as the provider spells it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => STATUS_QUEUED,
            Self::Running => STATUS_RUNNING,
            Self::Success => STATUS_SUCCESS,
            Self::Failed => STATUS_FAILED,
            Self::Cancelled => STATUS_CANCELLED,
            Self::Unknown(raw) => raw,
        }
    }

    /// `true` for `success`, `failed` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of one status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: TaskStatus,
    /// Completion percentage, clamped to `0..=100`.
    pub progress: u8,
    /// Provider-hosted location of the generated model, if any.
    pub result_asset: Option<String>,
    /// Provider-hosted location of the rendered preview, if any.
    pub result_preview: Option<String>,
}

impl StatusRecord {
    /// Build a record with no result locations.
    pub fn new(status: TaskStatus, progress: i64) -> Self {
        Self {
            status,
            progress: clamp_progress(progress),
            result_asset: None,
            result_preview: None,
        }
    }

    /// Attach result locations.
    pub fn with_result(mut self, asset: Option<String>, preview: Option<String>) -> Self {
        self.result_asset = asset;
        self.result_preview = preview;
        self
    }
}

/// Clamp a provider-reported progress value into `0..=100`.
pub fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}
