use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use printforge_pipeline::manager::validate_context;
use printforge_pipeline::session::SessionSnapshot;

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/generations/{context}/events
///
/// Upgrades to a WebSocket that receives every generation event of
/// `context`. The first frame is the current snapshot (`null` when the
/// context has never run).
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(context): Path<String>,
) -> AppResult<Response> {
    validate_context(&context)?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, context))
        .into_response())
}

/// Snapshot frame sent right after the upgrade.
fn snapshot_frame(snapshot: Option<&SessionSnapshot>) -> Option<Message> {
    let body = serde_json::json!({ "type": "snapshot", "snapshot": snapshot });
    match serde_json::to_string(&body) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize snapshot frame");
            None
        }
    }
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers the connection before reading the snapshot, so no event
/// published in between is lost.
async fn handle_socket(socket: WebSocket, state: AppState, context: String) {
    let ws_manager: Arc<WsManager> = Arc::clone(&state.ws_manager);
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, context = %context, "WebSocket connected");

    let mut rx = ws_manager.add(&context, conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    let snapshot = state.generations.snapshot(&context).await;
    if let Some(frame) = snapshot_frame(snapshot.as_ref()) {
        if sink.send(frame).await.is_err() {
            ws_manager.remove(&context, &conn_id).await;
            tracing::debug!(conn_id = %conn_id, "WebSocket closed before snapshot");
            return;
        }
    }

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Inbound frames carry nothing but keepalives and close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&context, &conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, context = %context, "WebSocket disconnected");
}
