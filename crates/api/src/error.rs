use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use printforge_core::error::CoreError;
use printforge_core::provider::{FetchFailed, FetchFailureKind, ProviderError};
use printforge_core::submission::SubmissionError;
use printforge_pipeline::manager::GenerationError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps domain errors from the core and pipeline crates and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `printforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A generation manager failure.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A status lookup against the provider failed.
    #[error(transparent)]
    Fetch(#[from] FetchFailed),

    /// A non-polling provider call (cancel, list) failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The route exists but its feature is switched off.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Upstream(msg) => {
                    tracing::warn!(error = %msg, "Upstream error");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => internal(msg),
            },

            // --- Generation manager ---
            AppError::Generation(err) => classify_generation_error(err),

            // --- Provider calls ---
            AppError::Fetch(err) => match err.kind {
                FetchFailureKind::HttpStatus(404) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "Task not found".to_string(),
                ),
                _ => {
                    tracing::warn!(error = %err, "Provider status lookup failed");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
                }
            },
            AppError::Provider(err) => {
                tracing::warn!(error = %err, "Provider call failed");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a [`GenerationError`] into an HTTP status, error code, and message.
///
/// - Bad input maps to 400, a provider refusal to 422.
/// - An unreachable provider maps to 502 with a sanitized message.
/// - Unknown contexts map to 404, finished ones to 409.
fn classify_generation_error(err: &GenerationError) -> (StatusCode, &'static str, String) {
    match err {
        GenerationError::InvalidContext(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        GenerationError::Submission(sub) => match sub {
            SubmissionError::MissingInput
            | SubmissionError::ConflictingInput
            | SubmissionError::Invalid(_) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", sub.to_string())
            }
            SubmissionError::Rejected(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PROVIDER_REJECTED",
                sub.to_string(),
            ),
            SubmissionError::Unavailable(detail) => {
                tracing::warn!(error = %detail, "Generation provider unavailable");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The generation service is unavailable, please try again later".to_string(),
                )
            }
        },
        GenerationError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        GenerationError::NotActive(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        GenerationError::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "SHUTTING_DOWN",
            err.to_string(),
        ),
    }
}
