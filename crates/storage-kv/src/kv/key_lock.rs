//! In-process advisory lock per logical key.
//!
//! Serializes read-modify-write on whole-document keys. Callers queue in
//! arrival order; the guard releases on drop, so an error (or panic unwind)
//! inside the critical section cannot wedge the key. Cross-tab/process
//! coordination is not provided; single-tab usage is a product-level
//! assumption.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLock {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("key lock registry");
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Acquire the lock for `key`, waiting behind earlier holders.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Run `fut` while holding the lock for `key`. At most one critical
    /// section runs per key at a time within this process.
    pub async fn with_key_lock<T, Fut>(&self, key: &str, fut: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_critical_sections_per_key() {
        let lock = Arc::new(KeyLock::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                lock.with_key_lock("games", async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let lock = Arc::new(KeyLock::new());
        let _guard = lock.acquire("games").await;
        // A different key must be acquirable while "games" is held.
        tokio::time::timeout(Duration::from_millis(50), lock.acquire("teams"))
            .await
            .expect("independent key acquired");
    }

    #[tokio::test]
    async fn error_in_critical_section_releases_the_lock() {
        let lock = Arc::new(KeyLock::new());
        let result: Result<(), &str> = lock.with_key_lock("games", async { Err("boom") }).await;
        assert!(result.is_err());
        // Lock must be free again.
        tokio::time::timeout(Duration::from_millis(50), lock.acquire("games"))
            .await
            .expect("lock released after error");
    }
}
