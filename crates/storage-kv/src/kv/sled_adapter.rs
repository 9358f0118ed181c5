//! Persistent KV adapter backed by one sled database per user.

use std::path::Path;

use async_trait::async_trait;
use matchops_core::{Result, StoreError};

use super::KvAdapter;

fn backend_err(err: sled::Error) -> StoreError {
    StoreError::Backend(format!("kv backend: {err}"))
}

pub struct SledKvAdapter {
    db: sled::Db,
    database_name: String,
}

impl SledKvAdapter {
    /// Open (or create) the database directory `<base_dir>/<database_name>`.
    pub fn open(base_dir: &Path, database_name: &str) -> Result<Self> {
        let db = sled::open(base_dir.join(database_name)).map_err(backend_err)?;
        Ok(Self {
            db,
            database_name: database_name.to_string(),
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }
}

#[async_trait]
impl KvAdapter for SledKvAdapter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .db
            .get(key)
            .map_err(backend_err)?
            .map(|value| value.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.db.insert(key, value).map_err(backend_err)?;
        self.db.flush_async().await.map_err(backend_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key).map_err(backend_err)?;
        self.db.flush_async().await.map_err(backend_err)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.db.iter().keys() {
            let key = entry.map_err(backend_err)?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        self.db.clear().map_err(backend_err)?;
        self.db.flush_async().await.map_err(backend_err)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_values_and_lists_keys() {
        let dir = tempdir().expect("tempdir");
        let kv = SledKvAdapter::open(dir.path(), "matchops_user_test").expect("open");

        kv.set("alpha", b"1".to_vec()).await.unwrap();
        kv.set("beta", b"2".to_vec()).await.unwrap();
        assert_eq!(kv.get("alpha").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get("missing").await.unwrap(), None);

        let mut keys = kv.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()]);

        kv.remove("alpha").await.unwrap();
        assert_eq!(kv.get("alpha").await.unwrap(), None);

        kv.clear().await.unwrap();
        assert!(kv.keys().await.unwrap().is_empty());
    }
}
