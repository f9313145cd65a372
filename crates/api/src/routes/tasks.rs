//! Route definitions for provider task management.
//!
//! ```text
//! GET    /                               list_tasks
//! POST   /batch                          batch_action
//! GET    /{task_id}                      get_task
//! DELETE /{task_id}                      cancel_task
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes nested under `/tasks`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks))
        .route("/batch", post(tasks::batch_action))
        .route("/{task_id}", get(tasks::get_task).delete(tasks::cancel_task))
}
