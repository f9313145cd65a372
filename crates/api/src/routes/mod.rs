pub mod generation;
pub mod health;
pub mod relay;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generations/{context}                           start (POST), snapshot (GET)
/// /generations/{context}/cancel                    cancel (POST)
/// /generations/{context}/events                    WebSocket event stream
///
/// /tasks                                           provider task list (GET)
/// /tasks/batch                                     batch action (POST)
/// /tasks/{task_id}                                 detail (GET), cancel (DELETE)
///
/// /relay/model?url=                                model relay (GET)
/// /relay/image?url=                                preview relay (GET)
/// /relay/download?url=&filename=                   attachment download (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generations", generation::router())
        .nest("/tasks", tasks::router())
        .nest("/relay", relay::router())
}
