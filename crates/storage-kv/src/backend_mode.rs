//! Effective backend-mode resolution.
//!
//! Priority: per-user KV preference → process env → `Local`. A `cloud`
//! answer from any source is downgraded to `Local` while cloud is
//! unavailable. Storage failures fall through to the next source and log;
//! they never raise. Mode changes never delete local data.

use log::warn;
use matchops_core::config::{is_cloud_available, process_default_mode, BackendMode};
use matchops_core::{Result, StoreError};

use crate::keys::KEY_BACKEND_MODE_PREF;
use crate::kv::KvAdapter;

async fn read_preference(kv: &dyn KvAdapter) -> Option<BackendMode> {
    match kv.get(KEY_BACKEND_MODE_PREF).await {
        Ok(Some(bytes)) => {
            let raw = String::from_utf8_lossy(&bytes);
            let mode = BackendMode::parse(&raw);
            if mode.is_none() {
                warn!("unrecognized backend-mode preference '{raw}'");
            }
            mode
        }
        Ok(None) => None,
        Err(err) => {
            warn!("backend-mode preference unreadable, falling through: {err}");
            None
        }
    }
}

/// Effective mode for the given user database.
pub async fn get_backend_mode(kv: &dyn KvAdapter) -> BackendMode {
    let requested = match read_preference(kv).await {
        Some(mode) => mode,
        None => process_default_mode(),
    };
    if requested == BackendMode::Cloud && !is_cloud_available() {
        return BackendMode::Local;
    }
    requested
}

/// Persist the per-user preference.
pub async fn set_backend_mode(kv: &dyn KvAdapter, mode: BackendMode) -> Result<()> {
    kv.set(KEY_BACKEND_MODE_PREF, mode.as_str().as_bytes().to_vec())
        .await
}

/// Switch the preference to cloud. Fails when cloud is unavailable.
pub async fn enable_cloud(kv: &dyn KvAdapter) -> Result<()> {
    if !is_cloud_available() {
        return Err(StoreError::Validation(
            "cloud backend is not configured".into(),
        ));
    }
    set_backend_mode(kv, BackendMode::Cloud).await
}

/// Switch the preference back to local. Never touches stored data.
pub async fn disable_cloud(kv: &dyn KvAdapter) -> Result<()> {
    set_backend_mode(kv, BackendMode::Local).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvAdapter;

    // Cloud env flags are unset in the test environment, so cloud is
    // unavailable here and `cloud` preferences must downgrade.

    #[tokio::test]
    async fn defaults_to_local_without_preference() {
        let kv = MemoryKvAdapter::new();
        assert_eq!(get_backend_mode(&kv).await, BackendMode::Local);
    }

    #[tokio::test]
    async fn cloud_preference_downgrades_while_unavailable() {
        let kv = MemoryKvAdapter::new();
        set_backend_mode(&kv, BackendMode::Cloud).await.unwrap();
        assert_eq!(get_backend_mode(&kv).await, BackendMode::Local);
    }

    #[tokio::test]
    async fn enable_cloud_fails_when_unavailable() {
        let kv = MemoryKvAdapter::new();
        let err = enable_cloud(&kv).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        // The failed enable must not have written a preference.
        assert_eq!(kv.get(KEY_BACKEND_MODE_PREF).await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_preference_falls_through_to_default() {
        let kv = MemoryKvAdapter::new();
        kv.set(KEY_BACKEND_MODE_PREF, b"turbo".to_vec())
            .await
            .unwrap();
        assert_eq!(get_backend_mode(&kv).await, BackendMode::Local);
    }

    #[tokio::test]
    async fn disable_cloud_preserves_other_keys() {
        let kv = MemoryKvAdapter::new();
        kv.set("teams", b"[]".to_vec()).await.unwrap();
        disable_cloud(&kv).await.unwrap();
        assert_eq!(kv.get("teams").await.unwrap(), Some(b"[]".to_vec()));
    }
}
