//! Route definitions for per-context generations.
//!
//! ```text
//! POST   /{context}                      start
//! GET    /{context}                      get_snapshot
//! POST   /{context}/cancel               cancel
//! GET    /{context}/events               ws::events_handler
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;
use crate::ws;

/// Routes nested under `/generations`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{context}",
            post(generation::start).get(generation::get_snapshot),
        )
        .route("/{context}/cancel", post(generation::cancel))
        .route("/{context}/events", get(ws::events_handler))
}
