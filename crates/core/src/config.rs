//! Backend-mode types and process-level environment flags.
//!
//! Resolution order for the effective mode is: per-user KV preference →
//! process env → `Local`. The KV half lives in the storage crate; this
//! module owns the types and the env half.

use serde::{Deserialize, Serialize};

/// Env var carrying the process-default backend mode.
pub const BACKEND_MODE_ENV: &str = "BACKEND_MODE";
/// Cloud REST endpoint; presence (with the key) makes cloud available.
pub const CLOUD_ENDPOINT_ENV: &str = "CLOUD_ENDPOINT";
/// Cloud anon/public API key.
pub const CLOUD_PUBLIC_KEY_ENV: &str = "CLOUD_PUBLIC_KEY";
/// Base directory for per-user local databases.
pub const DATA_DIR_ENV: &str = "MATCHOPS_DATA_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Local,
    Cloud,
}

impl Default for BackendMode {
    fn default() -> Self {
        Self::Local
    }
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "local" => Some(Self::Local),
            "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Cloud endpoint from the environment, if configured.
pub fn cloud_endpoint() -> Option<String> {
    non_blank(std::env::var(CLOUD_ENDPOINT_ENV).ok())
}

/// Cloud public key from the environment, if configured.
pub fn cloud_public_key() -> Option<String> {
    non_blank(std::env::var(CLOUD_PUBLIC_KEY_ENV).ok())
}

/// Cloud is available when both endpoint and key are configured.
pub fn is_cloud_available() -> bool {
    cloud_available_from(
        cloud_endpoint().as_deref(),
        cloud_public_key().as_deref(),
    )
}

pub(crate) fn cloud_available_from(endpoint: Option<&str>, key: Option<&str>) -> bool {
    matches!(
        (endpoint, key),
        (Some(e), Some(k)) if !e.trim().is_empty() && !k.trim().is_empty()
    )
}

/// Process-level default mode from `BACKEND_MODE`; `Local` when unset or
/// unrecognized.
pub fn process_default_mode() -> BackendMode {
    std::env::var(BACKEND_MODE_ENV)
        .ok()
        .and_then(|v| BackendMode::parse(&v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_round_trip() {
        assert_eq!(BackendMode::parse("local"), Some(BackendMode::Local));
        assert_eq!(BackendMode::parse(" cloud "), Some(BackendMode::Cloud));
        assert_eq!(BackendMode::parse("CLOUD"), None);
        assert_eq!(BackendMode::Cloud.as_str(), "cloud");
    }

    #[test]
    fn cloud_availability_requires_both_flags() {
        assert!(cloud_available_from(Some("https://x"), Some("key")));
        assert!(!cloud_available_from(Some("https://x"), None));
        assert!(!cloud_available_from(None, Some("key")));
        assert!(!cloud_available_from(Some("  "), Some("key")));
    }
}
