//! WebSocket infrastructure for live generation updates.
//!
//! Provides connection management, heartbeat monitoring, the per-context
//! events upgrade handler, and the task that forwards generation events
//! to subscribed connections.

mod forwarder;
mod handler;
mod heartbeat;
pub mod manager;

pub use forwarder::start_event_forwarder;
pub use handler::events_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
