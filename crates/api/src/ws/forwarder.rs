use std::sync::Arc;

use axum::extract::ws::Message;
use printforge_pipeline::events::GenerationEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn the task that routes generation events to the sockets following
/// their context.
///
/// Runs until `cancel` fires or the event channel closes. A lagging
/// receiver skips the missed events and keeps going; clients recover the
/// current state from the snapshot endpoint.
pub fn start_event_forwarder(
    mut events: broadcast::Receiver<GenerationEvent>,
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => received,
            };

            match event {
                Ok(event) => forward(&ws_manager, &event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Event forwarder stopped");
    })
}

async fn forward(ws_manager: &WsManager, event: &GenerationEvent) {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize generation event");
            return;
        }
    };

    let delivered = ws_manager
        .send_to_context(event.context(), Message::Text(text.into()))
        .await;
    tracing::trace!(
        context = %event.context(),
        job_id = %event.job_id(),
        delivered,
        "Generation event forwarded",
    );
}
