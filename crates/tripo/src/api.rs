//! REST client for the generation provider.
//!
//! Wraps task creation, lookup, cancellation and listing using
//! [`reqwest`]. Every call is a single round trip; retries are the
//! caller's business.

use serde::de::DeserializeOwned;

use crate::config::TripoConfig;
use crate::messages::{create_task_body, CreatedTask, Envelope, TaskData, CODE_OK};
use printforge_core::submission::ValidatedSubmission;

/// HTTP client for the provider API.
pub struct TripoApi {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

/// Errors from the provider REST layer.
#[derive(Debug, thiserror::Error)]
pub enum TripoApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider returned a non-zero envelope `code`.
    #[error("Provider error code {code}: {message}")]
    Business { code: i64, message: String },

    /// A success envelope arrived without its `data` payload.
    #[error("Provider response is missing data")]
    MissingData,
}

impl TripoApi {
    /// Create a client from configuration.
    pub fn new(config: &TripoConfig) -> Result<Self, TripoApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(
            client,
            config.api_url.clone(),
            config.api_key.clone(),
        ))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Create a generation task.
    ///
    /// Sends `POST /task` and returns the provider-assigned task id.
    pub async fn create_task(
        &self,
        submission: &ValidatedSubmission,
    ) -> Result<String, TripoApiError> {
        let response = self
            .client
            .post(format!("{}/task", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&create_task_body(submission))
            .send()
            .await?;

        let created: CreatedTask = Self::parse_envelope(response).await?;
        Ok(created.task_id)
    }

    /// Look up a single task. Sends `GET /task/{task_id}`.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskData, TripoApiError> {
        let response = self
            .client
            .get(format!("{}/task/{}", self.api_url, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    /// Cancel a task. Sends `DELETE /task/{task_id}`.
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), TripoApiError> {
        let response = self
            .client
            .delete(format!("{}/task/{}", self.api_url, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check_envelope(response).await
    }

    /// List tasks page by page. Sends `GET /task/list?page=&limit=`.
    ///
    /// The payload is passed through untouched.
    pub async fn list_tasks(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<serde_json::Value, TripoApiError> {
        let response = self
            .client
            .get(format!("{}/task/list", self.api_url))
            .bearer_auth(&self.api_key)
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, otherwise return
    /// [`TripoApiError::ApiError`] with the body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TripoApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TripoApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode the envelope and check its `code`.
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, TripoApiError> {
        let response = Self::ensure_success(response).await?;
        let envelope = response.json::<Envelope<T>>().await?;
        if envelope.code != CODE_OK {
            return Err(TripoApiError::Business {
                code: envelope.code,
                message: envelope
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        Ok(envelope)
    }

    async fn parse_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TripoApiError> {
        Self::read_envelope(response)
            .await?
            .data
            .ok_or(TripoApiError::MissingData)
    }

    async fn check_envelope(response: reqwest::Response) -> Result<(), TripoApiError> {
        Self::read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }
}
