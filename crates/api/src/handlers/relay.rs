//! Same-origin asset relay.
//!
//! Provider-hosted models and previews cannot always be loaded by the
//! browser directly (CORS, mixed content), so the viewer loads them
//! through these endpoints. The upstream body is streamed, never
//! buffered.
//!
//! Routes:
//! - `GET /relay/model?url=`                -- model file
//! - `GET /relay/image?url=`                -- preview image
//! - `GET /relay/download?url=&filename=`   -- model as an attachment

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use printforge_core::error::CoreError;
use printforge_core::relay::{filename_from_url, sanitize_filename};
use reqwest::redirect;
use serde::Deserialize;
use url::Url;

use crate::config::RelayConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// User agent sent upstream.
const RELAY_USER_AGENT: &str = concat!("printforge-relay/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed per relayed fetch.
const MAX_REDIRECTS: usize = 10;

/// Query parameters shared by the relay endpoints.
#[derive(Debug, Deserialize)]
pub struct RelayParams {
    pub url: Option<String>,
    /// Only used by the download endpoint.
    pub filename: Option<String>,
}

/// What is being relayed; decides the response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Model,
    Image,
    Download,
}

impl AssetKind {
    /// Content type used when upstream does not send one.
    pub fn default_content_type(self) -> &'static str {
        match self {
            Self::Model | Self::Download => "application/octet-stream",
            Self::Image => "image/jpeg",
        }
    }

    pub fn cache_control(self) -> Option<&'static str> {
        match self {
            Self::Model => Some("public, max-age=3600"),
            Self::Image => Some("public, max-age=7200"),
            Self::Download => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Model | Self::Download => "model",
            Self::Image => "image",
        }
    }
}

/// GET /api/v1/relay/model?url=
pub async fn relay_model(
    State(state): State<AppState>,
    Query(params): Query<RelayParams>,
) -> AppResult<Response> {
    relay(&state, params, AssetKind::Model).await
}

/// GET /api/v1/relay/image?url=
pub async fn relay_image(
    State(state): State<AppState>,
    Query(params): Query<RelayParams>,
) -> AppResult<Response> {
    relay(&state, params, AssetKind::Image).await
}

/// GET /api/v1/relay/download?url=&filename=
///
/// Without `filename`, the name is taken from the asset URL.
pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<RelayParams>,
) -> AppResult<Response> {
    relay(&state, params, AssetKind::Download).await
}

async fn relay(state: &AppState, params: RelayParams, kind: AssetKind) -> AppResult<Response> {
    let relay_config = &state.config.relay;
    if !relay_config.enabled {
        return Err(AppError::NotFound("Asset relay is disabled".into()));
    }

    let raw = params
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("url query parameter is required".into()))?;
    let target = validate_target(raw, relay_config)?;

    tracing::debug!(url = %target, kind = kind.label(), "Relaying asset");

    let upstream = state
        .relay_client
        .get(target.clone())
        .header(USER_AGENT, RELAY_USER_AGENT)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(url = %target, error = %e, "Relay fetch failed");
            CoreError::Upstream(format!("Failed to fetch {}", kind.label()))
        })?;

    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!(url = %target, status = status.as_u16(), "Relay upstream error");
        return Err(CoreError::Upstream(format!(
            "Failed to fetch {}: upstream returned {}",
            kind.label(),
            status.as_u16()
        ))
        .into());
    }

    let content_type = match kind {
        AssetKind::Download => HeaderValue::from_static(kind.default_content_type()),
        _ => upstream
            .headers()
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(kind.default_content_type())),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type);
    if let Some(len) = upstream.content_length() {
        builder = builder.header(CONTENT_LENGTH, len);
    }
    if let Some(cache) = kind.cache_control() {
        builder = builder.header(CACHE_CONTROL, cache);
    }
    if kind == AssetKind::Download {
        let filename = match params.filename.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_filename(name),
            _ => filename_from_url(target.as_str()),
        };
        builder = builder.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::InternalError(format!("Failed to build relay response: {e}")))
}

/// Parse the target URL and check it against the relay policy: http or
/// https only, with a host on the allowlist.
pub fn validate_target(raw: &str, config: &RelayConfig) -> AppResult<Url> {
    let url = Url::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid url: {e}")))?;
    match policy_violation(&url, config) {
        Some(reason) => {
            tracing::warn!(url = %url, reason = %reason, "Relay target rejected");
            Err(AppError::BadRequest(reason))
        }
        None => Ok(url),
    }
}

/// Why `url` may not be fetched by the relay, or `None` when it may.
fn policy_violation(url: &Url, config: &RelayConfig) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Some(format!("Unsupported url scheme '{}'", url.scheme()));
    }
    match url.host_str() {
        None => Some("url must have a host".to_string()),
        Some(host) if !config.allows_host(host) => Some(format!("Host '{host}' is not allowed")),
        Some(_) => None,
    }
}

/// HTTP client for relayed fetches. Every redirect hop is held to the
/// same scheme and host policy as the requested URL.
pub fn build_relay_client(
    config: &RelayConfig,
    timeout: Duration,
) -> reqwest::Result<reqwest::Client> {
    let config = config.clone();
    let policy = redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match policy_violation(attempt.url(), &config) {
            Some(reason) => {
                tracing::warn!(url = %attempt.url(), reason = %reason, "Relay redirect refused");
                attempt.error(reason)
            }
            None => attempt.follow(),
        }
    });

    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(policy)
        .build()
}
