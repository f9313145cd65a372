use axum::routing::get;
use axum::Router;
use printforge_core::relay::{RELAY_DOWNLOAD, RELAY_IMAGE, RELAY_MODEL};

use crate::handlers::relay;
use crate::state::AppState;

/// Routes nested under `/relay`; sub-paths match the URLs the result
/// materializer generates.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(&format!("/{RELAY_MODEL}"), get(relay::relay_model))
        .route(&format!("/{RELAY_IMAGE}"), get(relay::relay_image))
        .route(&format!("/{RELAY_DOWNLOAD}"), get(relay::download))
}
