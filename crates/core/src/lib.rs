//! MatchOps core: domain model, DataStore contract, error taxonomy, and the
//! sync domain model shared by the storage backends and the sync engine.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod datastore;
pub mod errors;
pub mod model;
pub mod sync;

pub use datastore::{BackendKind, DataStore};
pub use errors::{Result, RetryClass, StoreError};
