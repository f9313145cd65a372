//! Wire types for the provider's `v2/openapi` endpoints.
//!
//! Every response is wrapped in an [`Envelope`]; a non-zero `code` is a
//! business error even when the HTTP status is 200.

use printforge_core::status::{StatusRecord, TaskStatus};
use printforge_core::submission::ValidatedSubmission;
use serde::{Deserialize, Serialize};

/// Envelope `code` signalling success.
pub const CODE_OK: i64 = 0;

/// Standard response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    /// Absent on business errors.
    pub data: Option<T>,
}

/// `data` of a task creation response.
#[derive(Debug, Deserialize)]
pub struct CreatedTask {
    pub task_id: String,
}

/// Output locations of a task; all optional until the task succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub pbr_model: Option<String>,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub rendered_image: Option<String>,
}

/// `data` of a task lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    pub task_id: String,
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub create_time: Option<i64>,
}

impl TaskData {
    /// Location of the model to show: textured model first, then the
    /// plain and base models.
    pub fn model_url(&self) -> Option<&str> {
        let output = self.output.as_ref()?;
        output
            .pbr_model
            .as_deref()
            .or(output.model.as_deref())
            .or(output.base_model.as_deref())
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.output.as_ref()?.rendered_image.as_deref()
    }

    /// Normalize into the record the poller consumes.
    pub fn to_status_record(&self) -> StatusRecord {
        let progress = self.progress.unwrap_or(0.0).round() as i64;
        StatusRecord::new(self.status.clone(), progress).with_result(
            self.model_url().map(str::to_string),
            self.preview_url().map(str::to_string),
        )
    }
}

/// Request body for task creation.
pub fn create_task_body(submission: &ValidatedSubmission) -> serde_json::Value {
    match submission {
        ValidatedSubmission::Text { prompt } => serde_json::json!({
            "type": submission.kind().as_str(),
            "prompt": prompt,
        }),
        ValidatedSubmission::Image { token, image_type } => serde_json::json!({
            "type": submission.kind().as_str(),
            "file": {
                "type": image_type.as_str(),
                "file_token": token,
            },
        }),
    }
}
