//! [`StatusFetcher`] and [`GenerationProvider`] on top of [`TripoApi`].

use async_trait::async_trait;
use printforge_core::provider::{
    FetchFailed, FetchFailureKind, GenerationProvider, ProviderError, StatusFetcher,
};
use printforge_core::status::StatusRecord;
use printforge_core::submission::{SubmissionError, ValidatedSubmission};

use crate::api::{TripoApi, TripoApiError};

impl From<TripoApiError> for FetchFailed {
    fn from(err: TripoApiError) -> Self {
        let kind = match &err {
            TripoApiError::Request(e) if e.is_decode() => FetchFailureKind::Malformed,
            TripoApiError::Request(_) => FetchFailureKind::Transport,
            TripoApiError::ApiError { status, .. } => FetchFailureKind::HttpStatus(*status),
            TripoApiError::Business { code, .. } => FetchFailureKind::Provider { code: *code },
            TripoApiError::MissingData => FetchFailureKind::Malformed,
        };
        FetchFailed::new(kind, err.to_string())
    }
}

fn submission_error(err: TripoApiError) -> SubmissionError {
    match err {
        TripoApiError::Business { message, .. } => SubmissionError::Rejected(message),
        TripoApiError::ApiError { status, body } if (400..500).contains(&status) => {
            SubmissionError::Rejected(format!("HTTP {status}: {body}"))
        }
        other => SubmissionError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl StatusFetcher for TripoApi {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusRecord, FetchFailed> {
        let task = self.get_task(job_id).await?;
        Ok(task.to_status_record())
    }
}

#[async_trait]
impl GenerationProvider for TripoApi {
    async fn submit(&self, submission: &ValidatedSubmission) -> Result<String, SubmissionError> {
        let task_id = self
            .create_task(submission)
            .await
            .map_err(submission_error)?;

        tracing::info!(
            task_id = %task_id,
            kind = submission.kind().as_str(),
            "Generation task created",
        );
        Ok(task_id)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        let err = match self.cancel_task(job_id).await {
            Ok(()) => {
                tracing::info!(task_id = %job_id, "Task cancelled upstream");
                return Ok(());
            }
            Err(err) => err,
        };

        // Cancelling a finished task is not an error.
        if let Ok(task) = self.get_task(job_id).await {
            if task.status.is_terminal() {
                tracing::debug!(
                    task_id = %job_id,
                    status = %task.status,
                    "Cancel on finished task treated as success",
                );
                return Ok(());
            }
        }

        tracing::warn!(task_id = %job_id, error = %err, "Upstream cancel failed");
        Err(ProviderError(err.to_string()))
    }

    async fn list_tasks(&self, page: u32, limit: u32) -> Result<serde_json::Value, ProviderError> {
        TripoApi::list_tasks(self, page, limit)
            .await
            .map_err(|e| ProviderError(e.to_string()))
    }
}
