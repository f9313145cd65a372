//! Live event subscribers, grouped by generation context.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One open events socket.
struct Subscriber {
    sender: WsSender,
    connected_at: DateTime<Utc>,
}

/// Open events sockets keyed by context, then by connection id.
///
/// Wrap in `Arc` and share; every method takes `&self`.
#[derive(Default)]
pub struct WsManager {
    contexts: RwLock<HashMap<String, HashMap<String, Subscriber>>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn_id` to the events of `context`.
    ///
    /// Returns the receiver the socket's sender task drains.
    pub async fn add(&self, context: &str, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber {
            sender: tx,
            connected_at: Utc::now(),
        };
        self.contexts
            .write()
            .await
            .entry(context.to_string())
            .or_default()
            .insert(conn_id, subscriber);
        rx
    }

    /// Drop a subscription. A context left without subscribers is
    /// forgotten.
    pub async fn remove(&self, context: &str, conn_id: &str) {
        let mut contexts = self.contexts.write().await;
        let Some(subscribers) = contexts.get_mut(context) else {
            return;
        };
        if let Some(subscriber) = subscribers.remove(conn_id) {
            let connected_secs = (Utc::now() - subscriber.connected_at).num_seconds();
            tracing::debug!(conn_id, context, connected_secs, "Subscriber removed");
        }
        if subscribers.is_empty() {
            contexts.remove(context);
        }
    }

    /// Send a message to every socket following `context`.
    ///
    /// Returns how many sockets it was queued for.
    pub async fn send_to_context(&self, context: &str, message: Message) -> usize {
        let contexts = self.contexts.read().await;
        let Some(subscribers) = contexts.get(context) else {
            return 0;
        };
        subscribers
            .values()
            .filter(|s| s.sender.send(message.clone()).is_ok())
            .count()
    }

    /// Number of open sockets across all contexts.
    pub async fn connection_count(&self) -> usize {
        self.contexts.read().await.values().map(HashMap::len).sum()
    }

    /// Number of contexts with at least one socket.
    pub async fn context_count(&self) -> usize {
        self.contexts.read().await.len()
    }

    /// Send a Close frame to every socket, then forget them all.
    pub async fn shutdown_all(&self) {
        let mut contexts = self.contexts.write().await;
        let mut count = 0;
        for subscriber in contexts.values().flat_map(HashMap::values) {
            let _ = subscriber.sender.send(Message::Close(None));
            count += 1;
        }
        contexts.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Ping every socket; used by the heartbeat task.
    pub async fn ping_all(&self) {
        let contexts = self.contexts.read().await;
        for subscriber in contexts.values().flat_map(HashMap::values) {
            let _ = subscriber.sender.send(Message::Ping(Bytes::new()));
        }
    }
}
