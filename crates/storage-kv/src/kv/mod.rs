//! Asynchronous key/value adapter over the per-user local database.

mod key_lock;
mod memory;
mod naming;
mod sled_adapter;
mod user_storage;

pub use key_lock::KeyLock;
pub use memory::MemoryKvAdapter;
pub use naming::{
    database_name, extract_user_id, is_user_scoped, LEGACY_DATABASE_NAME, MAX_DATABASE_NAME_LEN,
    USER_DB_PREFIX,
};
pub use sled_adapter::SledKvAdapter;
pub use user_storage::UserStorageManager;

use async_trait::async_trait;
use matchops_core::Result;

/// Indexed, asynchronous key/value store. Keys are strings, values opaque
/// byte strings (serialized JSON at the call site). Backend failures map to
/// `StoreError::Backend`.
#[async_trait]
pub trait KvAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
    async fn clear(&self) -> Result<()>;
    fn is_available(&self) -> bool;
}
