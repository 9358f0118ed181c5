//! Local storage backend: per-user KV database, advisory key locks, the
//! LocalDataStore, and the durable sync queue.

pub mod backend_mode;
pub mod keys;
pub mod kv;
pub mod local;
pub mod queue;

pub use kv::{
    database_name, extract_user_id, is_user_scoped, KeyLock, KvAdapter, MemoryKvAdapter,
    SledKvAdapter, UserStorageManager, LEGACY_DATABASE_NAME, USER_DB_PREFIX,
};
pub use local::LocalDataStore;
pub use queue::SyncQueue;
