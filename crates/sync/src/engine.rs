//! Online/offline-aware sync engine: a single-writer loop draining the
//! durable queue through the injected executor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use matchops_core::connectivity::Connectivity;
use matchops_core::model::now_iso;
use matchops_core::sync::{
    backoff_seconds, disposition_for, SyncApplyOutcome, SyncDisposition, SyncEngineState,
    SyncExecutor, SyncQueueEntry, SyncStatus, MAX_ENTRY_ATTEMPTS,
};
use matchops_core::StoreError;
use matchops_storage_kv::SyncQueue;

/// Per-entry execution timeout; elapsing it drops (aborts) the in-flight
/// network call and counts as a transient failure.
const SYNC_OP_TIMEOUT: Duration = Duration::from_secs(30);
/// Fallback poll cadence while idle; enqueues wake the loop immediately.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

type StatusListener = Box<dyn Fn(&SyncStatus) + Send + Sync>;

struct StatusHub {
    current: StdMutex<SyncStatus>,
    listeners: StdMutex<Vec<(u64, StatusListener)>>,
    next_listener_id: AtomicU64,
}

impl StatusHub {
    fn new() -> Self {
        Self {
            current: StdMutex::new(SyncStatus::default()),
            listeners: StdMutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn snapshot(&self) -> SyncStatus {
        self.current.lock().expect("status lock").clone()
    }

    fn emit(&self, status: SyncStatus) {
        *self.current.lock().expect("status lock") = status.clone();
        let listeners = self.listeners.lock().expect("listener lock");
        for (_, listener) in listeners.iter() {
            listener(&status);
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners
            .lock()
            .expect("listener lock")
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Active status subscription; dropping it unsubscribes.
pub struct SyncStatusSubscription {
    hub: Weak<StatusHub>,
    id: u64,
}

impl Drop for SyncStatusSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

pub struct SyncEngine {
    queue: Arc<SyncQueue>,
    executor: Arc<RwLock<Option<Arc<dyn SyncExecutor>>>>,
    connectivity: Connectivity,
    hub: Arc<StatusHub>,
    wake: Arc<Notify>,
    cancel: StdMutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(queue: Arc<SyncQueue>, connectivity: Connectivity) -> Self {
        Self {
            queue,
            executor: Arc::new(RwLock::new(None)),
            connectivity,
            hub: Arc::new(StatusHub::new()),
            wake: Arc::new(Notify::new()),
            cancel: StdMutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub async fn set_executor(&self, executor: Arc<dyn SyncExecutor>) {
        *self.executor.write().await = Some(executor);
        self.wake.notify_one();
    }

    /// Start the drain loop. A second start while running is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }
        let cancel = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock") = cancel.clone();
        let worker = Worker {
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            connectivity: self.connectivity.clone(),
            hub: Arc::clone(&self.hub),
            wake: Arc::clone(&self.wake),
            cancel,
        };
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Cancel in-flight work and stop scheduling. The queue is untouched.
    pub async fn stop(&self) {
        self.cancel.lock().expect("cancel lock").cancel();
        self.wake.notify_waiters();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
        let mut status = self.hub.snapshot();
        status.state = SyncEngineState::Stopped;
        self.hub.emit(status);
    }

    /// Nudge the loop: something was enqueued.
    pub fn poke(&self) {
        self.wake.notify_one();
    }

    pub fn status(&self) -> SyncStatus {
        self.hub.snapshot()
    }

    pub fn on_status_change(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SyncStatusSubscription {
        let id = self.hub.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.hub
            .listeners
            .lock()
            .expect("listener lock")
            .push((id, Box::new(listener)));
        SyncStatusSubscription {
            hub: Arc::downgrade(&self.hub),
            id,
        }
    }
}

fn retry_delay(entry: &SyncQueueEntry) -> Option<Duration> {
    let at = entry.next_attempt_at.as_deref()?;
    let deadline = chrono::DateTime::parse_from_rfc3339(at).ok()?;
    let remaining = deadline.signed_duration_since(Utc::now());
    remaining.to_std().ok().filter(|d| !d.is_zero())
}

struct Worker {
    queue: Arc<SyncQueue>,
    executor: Arc<RwLock<Option<Arc<dyn SyncExecutor>>>>,
    connectivity: Connectivity,
    hub: Arc<StatusHub>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl Worker {
    async fn emit(&self, state: SyncEngineState) {
        let stats = self.queue.stats().await.unwrap_or_default();
        let mut status = self.hub.snapshot();
        status.state = state;
        status.pending_count = stats.pending_count;
        status.failed_count = stats.failed_count;
        self.hub.emit(status);
    }

    async fn emit_success(&self) {
        let stats = self.queue.stats().await.unwrap_or_default();
        let mut status = self.hub.snapshot();
        status.state = SyncEngineState::Syncing;
        status.pending_count = stats.pending_count;
        status.failed_count = stats.failed_count;
        status.last_synced_at = Some(now_iso());
        status.last_error = None;
        self.hub.emit(status);
    }

    async fn emit_error(&self, message: String) {
        let stats = self.queue.stats().await.unwrap_or_default();
        let mut status = self.hub.snapshot();
        status.state = SyncEngineState::Error;
        status.pending_count = stats.pending_count;
        status.failed_count = stats.failed_count;
        status.last_error = Some(message);
        self.hub.emit(status);
    }

    /// Idle wait: a wake, an online transition, a timer tick, or cancel.
    /// Returns false when cancelled.
    async fn idle_wait(
        &self,
        online_rx: &mut tokio::sync::watch::Receiver<bool>,
        max_wait: Duration,
    ) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.wake.notified() => true,
            _ = online_rx.changed() => true,
            _ = tokio::time::sleep(max_wait) => true,
        }
    }

    async fn run(self) {
        let mut online_rx = self.connectivity.subscribe();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if !self.connectivity.is_online() {
                self.emit(SyncEngineState::Paused).await;
                let resumed = tokio::select! {
                    _ = self.cancel.cancelled() => false,
                    changed = online_rx.changed() => changed.is_ok(),
                };
                if !resumed {
                    break;
                }
                continue;
            }

            let head = match self.queue.peek().await {
                Ok(head) => head,
                Err(err) => {
                    warn!("sync queue unreadable: {err}");
                    self.emit_error(format!("sync queue unreadable: {err}")).await;
                    if !self.idle_wait(&mut online_rx, Duration::from_secs(5)).await {
                        break;
                    }
                    continue;
                }
            };

            let Some(entry) = head else {
                // A surfaced failure keeps the engine in `error` until the
                // next successful drain clears it.
                if self.hub.snapshot().state != SyncEngineState::Error {
                    self.emit(SyncEngineState::Idle).await;
                }
                if !self.idle_wait(&mut online_rx, IDLE_POLL_INTERVAL).await {
                    break;
                }
                continue;
            };

            // The head drains strictly in order; a backoff deadline on it
            // delays the whole queue rather than reordering.
            if let Some(delay) = retry_delay(&entry) {
                self.emit(SyncEngineState::Idle).await;
                if !self.idle_wait(&mut online_rx, delay).await {
                    break;
                }
                continue;
            }

            let executor = { self.executor.read().await.clone() };
            let Some(executor) = executor else {
                self.emit(SyncEngineState::Idle).await;
                if !self.idle_wait(&mut online_rx, IDLE_POLL_INTERVAL).await {
                    break;
                }
                continue;
            };

            self.emit(SyncEngineState::Syncing).await;
            let applied = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(SYNC_OP_TIMEOUT, executor.apply(&entry)) => {
                    match result {
                        Ok(outcome) => outcome,
                        Err(_) => Err(StoreError::Network(format!(
                            "sync op timed out after {}s",
                            SYNC_OP_TIMEOUT.as_secs()
                        ))),
                    }
                }
            };

            match applied {
                Ok(SyncApplyOutcome::Applied) => {
                    if let Err(err) = self.queue.remove(&entry.id).await {
                        warn!("dequeue after successful sync failed: {err}");
                    }
                    self.emit_success().await;
                }
                Ok(SyncApplyOutcome::Skipped(reason)) => {
                    debug!(
                        "dropping sync entry {:?} {}: {reason}",
                        entry.entity_type, entry.entity_id
                    );
                    if let Err(err) = self.queue.remove(&entry.id).await {
                        warn!("dequeue of skipped entry failed: {err}");
                    }
                }
                Err(err) => match disposition_for(&err) {
                    SyncDisposition::Retry => {
                        let next_attempt = (Utc::now()
                            + chrono::Duration::seconds(backoff_seconds(entry.attempts) as i64))
                        .to_rfc3339();
                        match self
                            .queue
                            .record_failure(&entry.id, err.to_string(), Some(next_attempt))
                            .await
                        {
                            Ok(Some(attempts)) if attempts >= MAX_ENTRY_ATTEMPTS => {
                                let _ = self.queue.remove(&entry.id).await;
                                self.emit_error(format!(
                                    "giving up on {:?} {} after {attempts} attempts: {err}",
                                    entry.entity_type, entry.entity_id
                                ))
                                .await;
                            }
                            Ok(_) => {
                                debug!(
                                    "sync retry scheduled for {:?} {}: {err}",
                                    entry.entity_type, entry.entity_id
                                );
                            }
                            Err(queue_err) => {
                                warn!("recording sync failure failed: {queue_err}");
                            }
                        }
                    }
                    SyncDisposition::Surface => {
                        let _ = self.queue.remove(&entry.id).await;
                        self.emit_error(format!(
                            "sync failed for {:?} {}: {err}",
                            entry.entity_type, entry.entity_id
                        ))
                        .await;
                    }
                },
            }
        }

        self.emit(SyncEngineState::Stopped).await;
    }
}
