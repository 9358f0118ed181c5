//! In-memory KV adapter: the fallback for degraded environments and the
//! default substrate in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use matchops_core::Result;
use tokio::sync::RwLock;

use super::KvAdapter;

#[derive(Default)]
pub struct MemoryKvAdapter {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKvAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvAdapter for MemoryKvAdapter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}
