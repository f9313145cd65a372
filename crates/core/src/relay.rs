//! Result materialization: turning provider-hosted asset locations into
//! URLs the browser can load, optionally through the same-origin relay.

use serde::{Deserialize, Serialize};

/// Relay sub-path for 3D model files.
pub const RELAY_MODEL: &str = "model";
/// Relay sub-path for preview images.
pub const RELAY_IMAGE: &str = "image";
/// Relay sub-path for attachment downloads.
pub const RELAY_DOWNLOAD: &str = "download";

/// Filename used when none can be derived from the asset URL.
pub const DEFAULT_MODEL_FILENAME: &str = "model.glb";

/// Result locations exactly as the provider reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    pub asset: Option<String>,
    pub preview: Option<String>,
}

/// Client-usable result locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedResult {
    /// URL the viewer loads the model from.
    pub asset_url: Option<String>,
    /// URL of the rendered preview image.
    pub preview_url: Option<String>,
    /// URL that serves the model as a file download.
    pub download_url: Option<String>,
}

/// Converts a raw provider result into client-usable URLs.
///
/// Implementations must be pure: the same input always yields the
/// same output.
pub trait ResultMaterializer: Send + Sync {
    fn materialize(&self, raw: &RawResult) -> MaterializedResult;
}

/// Rewrites result URLs through a same-origin relay, or passes them
/// through untouched when no relay base is configured.
#[derive(Debug, Clone, Default)]
pub struct RelayMaterializer {
    relay_base: Option<String>,
}

impl RelayMaterializer {
    /// Relay through `base`, e.g. `/api/v1/relay`.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            relay_base: Some(base.trim_end_matches('/').to_string()),
        }
    }

    /// Hand provider URLs to the client unchanged.
    pub fn passthrough() -> Self {
        Self { relay_base: None }
    }

    pub fn relay_base(&self) -> Option<&str> {
        self.relay_base.as_deref()
    }
}

impl ResultMaterializer for RelayMaterializer {
    fn materialize(&self, raw: &RawResult) -> MaterializedResult {
        let Some(base) = self.relay_base.as_deref() else {
            return MaterializedResult {
                asset_url: raw.asset.clone(),
                preview_url: raw.preview.clone(),
                download_url: raw.asset.clone(),
            };
        };

        let original_asset = raw
            .asset
            .as_deref()
            .map(|a| unwrap_relay_url(a, base).unwrap_or_else(|| a.to_string()));

        MaterializedResult {
            asset_url: raw.asset.as_deref().map(|a| relay_url(base, RELAY_MODEL, a)),
            preview_url: raw
                .preview
                .as_deref()
                .map(|p| relay_url(base, RELAY_IMAGE, p)),
            download_url: original_asset.map(|a| {
                format!(
                    "{base}/{RELAY_DOWNLOAD}?url={}&filename={}",
                    urlencoding::encode(&a),
                    urlencoding::encode(&filename_from_url(&a)),
                )
            }),
        }
    }
}

/// Build `{base}/{kind}?url=<encoded>`, leaving URLs that already point
/// at the relay alone.
pub fn relay_url(base: &str, kind: &str, url: &str) -> String {
    if is_relay_url(url, base) {
        return url.to_string();
    }
    format!("{base}/{kind}?url={}", urlencoding::encode(url))
}

fn is_relay_url(url: &str, base: &str) -> bool {
    url.strip_prefix(base)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Recover the original URL from a relay URL built under `base`.
pub fn unwrap_relay_url(url: &str, base: &str) -> Option<String> {
    let rest = url.strip_prefix(base)?.strip_prefix('/')?;
    let (_, query) = rest.split_once('?')?;
    let encoded = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("url="))?;
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

/// Final path segment of `url` when it looks like a file name, else
/// [`DEFAULT_MODEL_FILENAME`].
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let has_extension = segment
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    if has_extension {
        sanitize_filename(segment)
    } else {
        DEFAULT_MODEL_FILENAME.to_string()
    }
}

/// Restrict a filename to `[A-Za-z0-9._-]` so it is safe in a
/// `Content-Disposition` header.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_MODEL_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}
