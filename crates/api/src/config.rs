use printforge_core::relay::RelayMaterializer;

/// Default mount point of the asset relay endpoints.
pub const DEFAULT_RELAY_BASE_PATH: &str = "/api/v1/relay";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Whether a local cancel also cancels the provider task (default: `false`).
    pub propagate_cancel: bool,
    /// Same-origin asset relay settings.
    pub relay: RelayConfig,
}

/// Settings for the asset relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// When off, result URLs are handed to clients unchanged and the
    /// relay endpoints answer 404.
    pub enabled: bool,
    /// Path prefix clients use to reach the relay.
    pub base_path: String,
    /// Hosts the relay may fetch from. Empty allows any host.
    pub allowed_hosts: Vec<String>,
}

impl RelayConfig {
    /// Materializer matching this configuration.
    pub fn materializer(&self) -> RelayMaterializer {
        if self.enabled {
            RelayMaterializer::new(self.base_path.clone())
        } else {
            RelayMaterializer::passthrough()
        }
    }

    /// Whether `host` is on the allowlist, either exactly or as a
    /// subdomain of an entry.
    pub fn allows_host(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: DEFAULT_RELAY_BASE_PATH.to_string(),
            allowed_hosts: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `PROPAGATE_CANCEL`     | `false`                    |
    /// | `RELAY_ENABLED`        | `true`                     |
    /// | `RELAY_BASE_PATH`      | `/api/v1/relay`            |
    /// | `RELAY_ALLOWED_HOSTS`  | (empty: any host)          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let propagate_cancel = parse_flag(std::env::var("PROPAGATE_CANCEL").ok(), false)
            .expect("PROPAGATE_CANCEL must be true or false");

        let relay = RelayConfig {
            enabled: parse_flag(std::env::var("RELAY_ENABLED").ok(), true)
                .expect("RELAY_ENABLED must be true or false"),
            base_path: std::env::var("RELAY_BASE_PATH")
                .unwrap_or_else(|_| DEFAULT_RELAY_BASE_PATH.into()),
            allowed_hosts: split_list(&std::env::var("RELAY_ALLOWED_HOSTS").unwrap_or_default())
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            propagate_cancel,
            relay,
        }
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a boolean flag; unset means `default`.
fn parse_flag(raw: Option<String>, default: bool) -> Option<bool> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Some(default),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Some(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Some(false),
        Some(_) => None,
    }
}
