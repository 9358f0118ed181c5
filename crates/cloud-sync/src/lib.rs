//! Cloud backend: REST client, RemoteDataStore with optimistic locking, and
//! the remote sync executor.

pub mod client;
pub mod executor;
pub mod retry;
pub mod rows;
pub mod store;

pub use client::CloudClient;
pub use executor::RemoteSyncExecutor;
pub use store::RemoteDataStore;

#[cfg(test)]
mod store_tests;
