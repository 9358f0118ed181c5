//! Durable FIFO of pending remote operations.
//!
//! The whole queue lives under one KV key; every mutation is a single
//! read-modify-write under the queue key lock, which is what makes the
//! dedup/coalescing invariants hold under concurrent producers within one
//! process.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::warn;
use matchops_core::sync::{coalesce, Coalesced, QueueStats, SyncQueueEntry};
use matchops_core::Result;

use crate::keys::KEY_SYNC_QUEUE;
use crate::kv::{KeyLock, KvAdapter};

/// How long a computed stats snapshot may be served before a rescan.
const STATS_TTL: Duration = Duration::from_millis(1000);

pub struct SyncQueue {
    kv: Arc<dyn KvAdapter>,
    lock: KeyLock,
    stats_cache: Mutex<Option<(Instant, QueueStats)>>,
}

impl SyncQueue {
    pub fn new(kv: Arc<dyn KvAdapter>) -> Self {
        Self {
            kv,
            lock: KeyLock::new(),
            stats_cache: Mutex::new(None),
        }
    }

    async fn read_entries(&self) -> Result<Vec<SyncQueueEntry>> {
        match self.kv.get(KEY_SYNC_QUEUE).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => Ok(entries),
                Err(err) => {
                    warn!("sync queue document unreadable, starting empty: {err}");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn write_entries(&self, entries: &[SyncQueueEntry]) -> Result<()> {
        self.kv
            .set(KEY_SYNC_QUEUE, serde_json::to_vec(entries)?)
            .await?;
        self.invalidate_stats();
        Ok(())
    }

    fn invalidate_stats(&self) {
        *self.stats_cache.lock().expect("stats cache") = None;
    }

    /// Append `entry`, coalescing against a prior pending op for the same
    /// `(entity_type, entity_id)`. Merged replacements keep the prior
    /// entry's queue position.
    pub async fn enqueue(&self, entry: SyncQueueEntry) -> Result<()> {
        let _guard = self.lock.acquire(KEY_SYNC_QUEUE).await;
        let mut entries = self.read_entries().await?;
        let prior = entries
            .iter()
            .position(|e| e.entity_type == entry.entity_type && e.entity_id == entry.entity_id);
        match prior {
            Some(pos) => match coalesce(&entries[pos], entry) {
                Coalesced::Replace(merged) => entries[pos] = merged,
                Coalesced::RemoveBoth => {
                    entries.remove(pos);
                }
            },
            None => entries.push(entry),
        }
        self.write_entries(&entries).await
    }

    /// The head of the queue, if any. Entries drain strictly in order; a
    /// head waiting out a retry backoff blocks the drain rather than being
    /// overtaken.
    pub async fn peek(&self) -> Result<Option<SyncQueueEntry>> {
        Ok(self.read_entries().await?.into_iter().next())
    }

    /// Remove the entry with the given id. Returns whether it was present.
    pub async fn remove(&self, entry_id: &str) -> Result<bool> {
        let _guard = self.lock.acquire(KEY_SYNC_QUEUE).await;
        let mut entries = self.read_entries().await?;
        let before = entries.len();
        entries.retain(|e| e.id != entry_id);
        let removed = entries.len() != before;
        if removed {
            self.write_entries(&entries).await?;
        }
        Ok(removed)
    }

    /// Record a failed attempt on an entry: bump `attempts`, store the error
    /// and the retry deadline. Returns the new attempt count, or `None` when
    /// the entry is gone (coalesced away mid-flight).
    pub async fn record_failure(
        &self,
        entry_id: &str,
        error: String,
        next_attempt_at: Option<String>,
    ) -> Result<Option<u32>> {
        let _guard = self.lock.acquire(KEY_SYNC_QUEUE).await;
        let mut entries = self.read_entries().await?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(None);
        };
        entry.attempts += 1;
        entry.last_error = Some(error);
        entry.next_attempt_at = next_attempt_at;
        let attempts = entry.attempts;
        self.write_entries(&entries).await?;
        Ok(Some(attempts))
    }

    /// Queue counters, served from a short-TTL cache to avoid rescanning the
    /// document on every status emit.
    pub async fn stats(&self) -> Result<QueueStats> {
        if let Some((computed_at, stats)) = *self.stats_cache.lock().expect("stats cache") {
            if computed_at.elapsed() < STATS_TTL {
                return Ok(stats);
            }
        }
        let entries = self.read_entries().await?;
        let stats = QueueStats {
            pending_count: entries.len(),
            failed_count: entries.iter().filter(|e| e.attempts > 0).count(),
        };
        *self.stats_cache.lock().expect("stats cache") = Some((Instant::now(), stats));
        Ok(stats)
    }

    /// All pending entries in queue order.
    pub async fn entries(&self) -> Result<Vec<SyncQueueEntry>> {
        self.read_entries().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.read_entries().await?.is_empty())
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.acquire(KEY_SYNC_QUEUE).await;
        self.kv.remove(KEY_SYNC_QUEUE).await?;
        self.invalidate_stats();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvAdapter;
    use matchops_core::sync::{SyncEntityKind, SyncOp};

    fn queue() -> SyncQueue {
        SyncQueue::new(Arc::new(MemoryKvAdapter::new()))
    }

    fn entry(
        kind: SyncEntityKind,
        entity_id: &str,
        op: SyncOp,
        data: Option<serde_json::Value>,
    ) -> SyncQueueEntry {
        SyncQueueEntry::new(kind, entity_id, op, data)
    }

    #[tokio::test]
    async fn appends_distinct_entities_in_fifo_order() {
        let queue = queue();
        queue
            .enqueue(entry(SyncEntityKind::Player, "p1", SyncOp::Create, None))
            .await
            .unwrap();
        queue
            .enqueue(entry(SyncEntityKind::Team, "t1", SyncOp::Create, None))
            .await
            .unwrap();

        let entries = queue.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "p1");
        assert_eq!(entries[1].entity_id, "t1");
    }

    #[tokio::test]
    async fn create_update_delete_reduces_to_nothing() {
        let queue = queue();
        queue
            .enqueue(entry(
                SyncEntityKind::Player,
                "p1",
                SyncOp::Create,
                Some(serde_json::json!({ "name": "A" })),
            ))
            .await
            .unwrap();
        queue
            .enqueue(entry(
                SyncEntityKind::Player,
                "p1",
                SyncOp::Update,
                Some(serde_json::json!({ "name": "B" })),
            ))
            .await
            .unwrap();
        queue
            .enqueue(entry(SyncEntityKind::Player, "p1", SyncOp::Delete, None))
            .await
            .unwrap();

        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn coalesced_replacement_keeps_queue_position() {
        let queue = queue();
        queue
            .enqueue(entry(SyncEntityKind::Player, "p1", SyncOp::Update, None))
            .await
            .unwrap();
        queue
            .enqueue(entry(SyncEntityKind::Team, "t1", SyncOp::Update, None))
            .await
            .unwrap();
        queue
            .enqueue(entry(
                SyncEntityKind::Player,
                "p1",
                SyncOp::Update,
                Some(serde_json::json!({ "name": "B" })),
            ))
            .await
            .unwrap();

        let entries = queue.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entity_id, "p1");
        assert_eq!(entries[0].data.as_ref().unwrap()["name"], "B");
        assert_eq!(entries[1].entity_id, "t1");
    }

    #[tokio::test]
    async fn same_entity_id_different_kind_does_not_coalesce() {
        let queue = queue();
        queue
            .enqueue(entry(SyncEntityKind::Player, "x", SyncOp::Create, None))
            .await
            .unwrap();
        queue
            .enqueue(entry(SyncEntityKind::Team, "x", SyncOp::Delete, None))
            .await
            .unwrap();
        assert_eq!(queue.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_producers_preserve_coalescing() {
        let queue = Arc::new(queue());
        let mut handles = Vec::new();
        for i in 0..10 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(entry(
                        SyncEntityKind::Player,
                        "p1",
                        SyncOp::Update,
                        Some(serde_json::json!({ "rev": i })),
                    ))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // Serialized enqueues: exactly one surviving entry for the key.
        assert_eq!(queue.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_failure_bumps_attempts_and_stats() {
        let queue = queue();
        let e = entry(SyncEntityKind::Game, "g1", SyncOp::Update, None);
        let id = e.id.clone();
        queue.enqueue(e).await.unwrap();

        let attempts = queue
            .record_failure(&id, "network: offline".into(), None)
            .await
            .unwrap();
        assert_eq!(attempts, Some(1));

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.failed_count, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let queue = queue();
        let e = entry(SyncEntityKind::Game, "g1", SyncOp::Delete, None);
        let id = e.id.clone();
        queue.enqueue(e).await.unwrap();
        assert!(queue.remove(&id).await.unwrap());
        assert!(!queue.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_document_degrades_to_empty() {
        let kv = Arc::new(MemoryKvAdapter::new());
        kv.set(KEY_SYNC_QUEUE, b"{not json".to_vec()).await.unwrap();
        let queue = SyncQueue::new(kv);
        assert!(queue.is_empty().await.unwrap());
    }
}
