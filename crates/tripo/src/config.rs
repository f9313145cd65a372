use std::time::Duration;

use printforge_core::error::CoreError;

/// Default provider endpoint.
pub const DEFAULT_API_URL: &str = "https://api.tripo3d.ai/v2/openapi";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct TripoConfig {
    /// Base URL, without trailing slash.
    pub api_url: String,
    /// Bearer token for the provider API.
    pub api_key: String,
    /// Timeout applied to every provider request.
    pub request_timeout: Duration,
}

impl TripoConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Load settings from the environment.
    ///
    /// | Env Var                      | Default                              |
    /// |------------------------------|--------------------------------------|
    /// | `TRIPO_API_URL`              | `https://api.tripo3d.ai/v2/openapi`  |
    /// | `TRIPO3D_API_KEY`            | (required)                           |
    /// | `TRIPO_REQUEST_TIMEOUT_SECS` | `30`                                 |
    pub fn from_env() -> Result<Self, CoreError> {
        let api_key = std::env::var("TRIPO3D_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CoreError::Validation("TRIPO3D_API_KEY is not configured".into()))?;

        let api_url = std::env::var("TRIPO_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

        let timeout_secs = match std::env::var("TRIPO_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                CoreError::Validation(format!(
                    "TRIPO_REQUEST_TIMEOUT_SECS must be a valid u64, got '{raw}'"
                ))
            })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            request_timeout: Duration::from_secs(timeout_secs),
            ..Self::new(api_url, api_key)
        })
    }
}
