use std::sync::Arc;

use printforge_core::provider::GenerationProvider;
use printforge_core::relay::ResultMaterializer;
use printforge_pipeline::manager::GenerationManager;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Generation provider, used directly by the task endpoints.
    pub provider: Arc<dyn GenerationProvider>,
    /// Per-context generation sessions.
    pub generations: Arc<GenerationManager>,
    /// Turns provider result locations into client URLs.
    pub materializer: Arc<dyn ResultMaterializer>,
    /// HTTP client the asset relay fetches through.
    pub relay_client: reqwest::Client,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}
