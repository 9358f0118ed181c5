//! Error taxonomy shared by every DataStore implementation.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Retry policy class for failed store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors raised by store operations.
///
/// The set is closed: remote backends classify whatever they see into one of
/// these variants. "Not found" is not an error; single-entity lookups and
/// updates of absent ids resolve to `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation attempted before `initialize()` resolved.
    #[error("store is not initialized")]
    NotInitialized,

    /// Offline, or a transient transport/server failure.
    #[error("network error: {0}")]
    Network(String),

    /// User missing or session revoked.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Local precondition failure (empty name, oversized name, missing parent).
    #[error("validation error: {0}")]
    Validation(String),

    /// Composite uniqueness key collision.
    #[error("{entity} already exists: {detail}")]
    AlreadyExists { entity: &'static str, detail: String },

    /// Optimistic-lock failure on a versioned write. Carries the current
    /// server state so the caller can reconcile.
    #[error("version conflict on game {game_id}")]
    Conflict {
        game_id: String,
        server_state: Option<Box<serde_json::Value>>,
    },

    /// Backend throttle; `retry_after_secs` is the server hint when present.
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Unclassified backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Unreadable collection document. Reads degrade to empty and log;
    /// this surfaces only from paths that cannot degrade.
    #[error("corrupted document under key '{key}': {detail}")]
    StorageCorruption { key: String, detail: String },
}

impl StoreError {
    pub fn already_exists(entity: &'static str, detail: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            detail: detail.into(),
        }
    }

    pub fn conflict(game_id: impl Into<String>, server_state: Option<serde_json::Value>) -> Self {
        Self::Conflict {
            game_id: game_id.into(),
            server_state: server_state.map(Box::new),
        }
    }

    pub fn corruption(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StorageCorruption {
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code, part of the public contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Network(_) => "NETWORK",
            Self::Auth(_) => "AUTH",
            Self::Validation(_) => "VALIDATION",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Conflict { .. } => "CONFLICT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Backend(_) => "BACKEND",
            Self::StorageCorruption { .. } => "STORAGE_CORRUPTION",
        }
    }

    /// Classify for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) | Self::RateLimited { .. } | Self::Backend(_) => RetryClass::Retryable,
            Self::Auth(_) => RetryClass::ReauthRequired,
            Self::NotInitialized
            | Self::Validation(_)
            | Self::AlreadyExists { .. }
            | Self::Conflict { .. }
            | Self::StorageCorruption { .. } => RetryClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.retry_class() == RetryClass::Retryable
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(StoreError::NotInitialized.code(), "NOT_INITIALIZED");
        assert_eq!(StoreError::Network("offline".into()).code(), "NETWORK");
        assert_eq!(
            StoreError::already_exists("team", "Eagles").code(),
            "ALREADY_EXISTS"
        );
        assert_eq!(StoreError::conflict("game_1", None).code(), "CONFLICT");
    }

    #[test]
    fn retry_classification() {
        assert_eq!(
            StoreError::Network("timeout".into()).retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            StoreError::RateLimited {
                retry_after_secs: Some(2)
            }
            .retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            StoreError::Auth("revoked".into()).retry_class(),
            RetryClass::ReauthRequired
        );
        assert_eq!(
            StoreError::Validation("empty name".into()).retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            StoreError::conflict("game_1", None).retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn conflict_carries_server_state() {
        let err = StoreError::conflict("game_9", Some(serde_json::json!({ "version": 4 })));
        match err {
            StoreError::Conflict {
                game_id,
                server_state,
            } => {
                assert_eq!(game_id, "game_9");
                assert_eq!(server_state.unwrap()["version"], 4);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
