//! HTTP client for the hosted text/image-to-3D generation API.
//!
//! Wraps task creation, status lookup, cancellation and listing, and
//! implements the core provider traits on top of them.

pub mod api;
pub mod config;
pub mod messages;
pub mod provider;

pub use api::{TripoApi, TripoApiError};
pub use config::TripoConfig;
