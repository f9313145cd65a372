use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use printforge_api::config::ServerConfig;
use printforge_api::handlers::relay::build_relay_client;
use printforge_api::router::build_app_router;
use printforge_api::state::AppState;
use printforge_api::ws;
use printforge_core::polling::PollConfig;
use printforge_core::provider::GenerationProvider;
use printforge_core::relay::ResultMaterializer;
use printforge_pipeline::manager::GenerationManager;
use printforge_tripo::api::TripoApi;
use printforge_tripo::config::TripoConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Timeout for a single relayed asset fetch.
const RELAY_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "printforge_api=debug,printforge_pipeline=debug,printforge_tripo=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let poll_config = PollConfig::from_env().expect("Invalid polling configuration");
    tracing::info!(
        max_attempts = poll_config.max_attempts,
        poll_interval_ms = poll_config.poll_interval.as_millis() as u64,
        stuck_timeout_ms = poll_config.stuck_timeout.as_millis() as u64,
        "Loaded polling configuration"
    );

    let tripo_config = TripoConfig::from_env().expect("Invalid provider configuration");

    // --- Provider ---
    let provider: Arc<dyn GenerationProvider> =
        Arc::new(TripoApi::new(&tripo_config).expect("Failed to build provider client"));
    tracing::info!(api_url = %tripo_config.api_url, "Generation provider configured");

    // --- Result materializer ---
    let materializer: Arc<dyn ResultMaterializer> = Arc::new(config.relay.materializer());
    if config.relay.enabled {
        tracing::info!(base_path = %config.relay.base_path, "Asset relay enabled");
    } else {
        tracing::info!("Asset relay disabled, result URLs pass through");
    }

    let relay_client = build_relay_client(&config.relay, RELAY_FETCH_TIMEOUT)
        .expect("Failed to build relay HTTP client");

    // --- Generation manager ---
    let generations = Arc::new(GenerationManager::new(
        Arc::clone(&provider),
        Arc::clone(&materializer),
        poll_config,
        config.propagate_cancel,
    ));

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    let forwarder_cancel = CancellationToken::new();
    let forwarder_handle = ws::start_event_forwarder(
        generations.subscribe(),
        Arc::clone(&ws_manager),
        forwarder_cancel.clone(),
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        provider,
        generations: Arc::clone(&generations),
        materializer,
        relay_client,
        ws_manager: Arc::clone(&ws_manager),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, generations.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Generation manager did not shut down in time");
    } else {
        tracing::info!("Generation manager shut down");
    }

    forwarder_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    tracing::info!("Event forwarder stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to start graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
