//! Process-wide handle to the current user's storage adapter.
//!
//! One adapter per authenticated user; `open_user_storage` on sign-in and
//! `close_user_storage` on sign-out never overlap in the single-user design.

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use matchops_core::config::DATA_DIR_ENV;
use matchops_core::Result;
use tokio::sync::Mutex;

use super::{database_name, KvAdapter, SledKvAdapter, LEGACY_DATABASE_NAME};

/// Marker left in the legacy database after its content was adopted.
const LEGACY_ADOPTED_KEY: &str = "__adoptedBy";

pub struct UserStorageManager {
    base_dir: PathBuf,
    current: Mutex<Option<(String, Arc<SledKvAdapter>)>>,
}

impl UserStorageManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            current: Mutex::new(None),
        }
    }

    /// Base directory from `MATCHOPS_DATA_DIR`, defaulting to `./data`.
    pub fn from_env() -> Self {
        let base_dir = std::env::var(DATA_DIR_ENV).unwrap_or_else(|_| "data".to_string());
        Self::new(base_dir)
    }

    /// Open (or reuse) the adapter for `user_id`. A previously open adapter
    /// for another user is closed first.
    pub async fn open_user_storage(&self, user_id: &str) -> Result<Arc<SledKvAdapter>> {
        let name = database_name(user_id)?;
        let mut current = self.current.lock().await;
        if let Some((open_name, adapter)) = current.as_ref() {
            if *open_name == name {
                return Ok(Arc::clone(adapter));
            }
        }

        let adapter = Arc::new(SledKvAdapter::open(&self.base_dir, &name)?);
        self.adopt_legacy_database(&adapter, &name).await;
        *current = Some((name, Arc::clone(&adapter)));
        Ok(adapter)
    }

    /// Close the current adapter. Best-effort; never fails the caller.
    pub async fn close_user_storage(&self) {
        let mut current = self.current.lock().await;
        if let Some((name, _adapter)) = current.take() {
            info!("closed user storage '{name}'");
        }
    }

    /// One-time adoption of the pre-scoping database: copy its keys into the
    /// fresh user database, then mark the legacy database as adopted.
    async fn adopt_legacy_database(&self, target: &SledKvAdapter, target_name: &str) {
        let legacy_path = self.base_dir.join(LEGACY_DATABASE_NAME);
        if !legacy_path.exists() {
            return;
        }
        let legacy = match SledKvAdapter::open(&self.base_dir, LEGACY_DATABASE_NAME) {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!("legacy database present but unreadable: {err}");
                return;
            }
        };
        match legacy.get(LEGACY_ADOPTED_KEY).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!("legacy adoption check failed: {err}");
                return;
            }
        }
        // Only adopt into an empty target; an already-populated user database
        // wins over legacy content.
        match target.keys().await {
            Ok(keys) if keys.is_empty() => {}
            Ok(_) => return,
            Err(err) => {
                warn!("legacy adoption skipped, target unreadable: {err}");
                return;
            }
        }

        let result: Result<()> = async {
            for key in legacy.keys().await? {
                if key == LEGACY_ADOPTED_KEY {
                    continue;
                }
                if let Some(value) = legacy.get(&key).await? {
                    target.set(&key, value).await?;
                }
            }
            legacy
                .set(LEGACY_ADOPTED_KEY, target_name.as_bytes().to_vec())
                .await
        }
        .await;

        match result {
            Ok(()) => info!("adopted legacy database into '{target_name}'"),
            Err(err) => warn!("legacy adoption failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reuses_adapter_for_same_user() {
        let dir = tempdir().expect("tempdir");
        let manager = UserStorageManager::new(dir.path());
        let a = manager.open_user_storage("user1").await.unwrap();
        let b = manager.open_user_storage("user1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn rejects_invalid_user_id() {
        let dir = tempdir().expect("tempdir");
        let manager = UserStorageManager::new(dir.path());
        assert!(manager.open_user_storage("bad user").await.is_err());
    }

    #[tokio::test]
    async fn adopts_legacy_database_once() {
        let dir = tempdir().expect("tempdir");
        {
            let legacy = SledKvAdapter::open(dir.path(), LEGACY_DATABASE_NAME).unwrap();
            legacy.set("teams", b"[]".to_vec()).await.unwrap();
        }

        let manager = UserStorageManager::new(dir.path());
        let adapter = manager.open_user_storage("user1").await.unwrap();
        assert_eq!(adapter.get("teams").await.unwrap(), Some(b"[]".to_vec()));

        // A second user signing in later must not re-adopt.
        manager.close_user_storage().await;
        drop(adapter);
        let manager = UserStorageManager::new(dir.path());
        let other = manager.open_user_storage("user2").await.unwrap();
        assert_eq!(other.get("teams").await.unwrap(), None);
    }
}
