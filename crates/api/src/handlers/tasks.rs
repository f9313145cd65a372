//! Handlers for provider task management.
//!
//! These talk to the provider directly and are independent of the
//! per-context generation sessions.
//!
//! Routes:
//! - `GET    /tasks`            -- one page of the provider's task list
//! - `GET    /tasks/{task_id}`  -- normalized status of one task
//! - `DELETE /tasks/{task_id}`  -- cancel a task upstream
//! - `POST   /tasks/batch`      -- apply an action to many tasks

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use printforge_core::relay::{MaterializedResult, RawResult};
use printforge_core::status::TaskStatus;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Default page size for the task list.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// The only batch action the provider supports.
pub const BATCH_ACTION_CANCEL: &str = "cancel";

/// Query parameters for `GET /tasks`.
#[derive(Debug, Deserialize, Validate)]
pub struct ListTasksParams {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

/// Normalized view of one provider task.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    /// Client-usable result locations once the task succeeded.
    pub result: Option<MaterializedResult>,
}

#[derive(Debug, Serialize)]
pub struct CancelledTask {
    pub task_id: String,
    pub cancelled: bool,
}

/// Body of `POST /tasks/batch`.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchRequest {
    pub action: String,
    #[validate(length(min = 1, max = 50, message = "task_ids must hold 1-50 ids"))]
    pub task_ids: Vec<String>,
}

/// Outcome for a single task in a batch.
#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub task_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
    pub summary: BatchSummary,
}

/// GET /api/v1/tasks?page=&limit=
///
/// Passes the provider's page through untouched.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> AppResult<impl IntoResponse> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let data = state.provider.list_tasks(page, limit).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    validate_task_id(&task_id)?;

    let record = state.provider.fetch_status(&task_id).await?;
    let result = (record.status == TaskStatus::Success).then(|| {
        state.materializer.materialize(&RawResult {
            asset: record.result_asset.clone(),
            preview: record.result_preview.clone(),
        })
    });

    Ok(Json(DataResponse {
        data: TaskDetail {
            task_id,
            status: record.status,
            progress: record.progress,
            result,
        },
    }))
}

/// DELETE /api/v1/tasks/{task_id}
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    validate_task_id(&task_id)?;

    state.provider.cancel(&task_id).await?;
    tracing::info!(task_id = %task_id, "Task cancelled via API");

    Ok(Json(DataResponse {
        data: CancelledTask {
            task_id,
            cancelled: true,
        },
    }))
}

/// POST /api/v1/tasks/batch
///
/// Runs the action for every id and reports each result; one failing
/// task does not fail the batch.
pub async fn batch_action(
    State(state): State<AppState>,
    Json(input): Json<BatchRequest>,
) -> AppResult<impl IntoResponse> {
    if input.action != BATCH_ACTION_CANCEL {
        return Err(AppError::BadRequest(format!(
            "Unsupported action '{}'. Must be one of: {BATCH_ACTION_CANCEL}",
            input.action
        )));
    }
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    for task_id in &input.task_ids {
        validate_task_id(task_id)?;
    }

    let provider = &state.provider;
    let results: Vec<BatchItemResult> =
        futures::future::join_all(input.task_ids.into_iter().map(|task_id| async move {
            match provider.cancel(&task_id).await {
                Ok(()) => BatchItemResult {
                    task_id,
                    success: true,
                    error: None,
                },
                Err(e) => BatchItemResult {
                    task_id,
                    success: false,
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;

    let successful = results.iter().filter(|r| r.success).count();
    let summary = BatchSummary {
        total: results.len(),
        successful,
        failed: results.len() - successful,
    };
    tracing::info!(
        total = summary.total,
        failed = summary.failed,
        "Batch cancel finished",
    );

    Ok(Json(DataResponse {
        data: BatchResponse { results, summary },
    }))
}

/// Task ids are opaque provider tokens; reject anything that could
/// escape the provider's URL path.
fn validate_task_id(task_id: &str) -> AppResult<()> {
    let valid = !task_id.is_empty()
        && task_id.len() <= 128
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid task id '{task_id}'")))
    }
}
