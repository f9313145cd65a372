//! Handlers for per-context generations.
//!
//! Routes:
//! - `POST /generations/{context}`         -- submit and start polling
//! - `GET  /generations/{context}`         -- current session snapshot
//! - `POST /generations/{context}/cancel`  -- cancel the running session

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use printforge_core::submission::SubmitRequest;
use printforge_pipeline::manager::GenerationError;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/generations/{context}
///
/// Replaces any generation already running in the context. Answers 202
/// with the initial snapshot; progress arrives on the events socket or
/// by polling the snapshot.
pub async fn start(
    State(state): State<AppState>,
    Path(context): Path<String>,
    Json(input): Json<SubmitRequest>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.generations.start(&context, input).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: snapshot })))
}

/// GET /api/v1/generations/{context}
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .generations
        .snapshot(&context)
        .await
        .ok_or(GenerationError::NotFound(context))?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/v1/generations/{context}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.generations.cancel(&context).await?;
    Ok(Json(DataResponse { data: snapshot }))
}
