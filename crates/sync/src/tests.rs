use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use matchops_core::connectivity::Connectivity;
use matchops_core::model::{
    NewGame, NewPersonnelMember, NewPlayer, NewPlayerAdjustment, NewSeason, NewTeam,
    NewTournament, PersonnelRole, SettingsPatch, TimerState, WarmupPlan, WarmupSection,
};
use matchops_core::sync::{
    SyncApplyOutcome, SyncEngineState, SyncEntityKind, SyncExecutor, SyncOp, SyncQueueEntry,
    SyncStatus,
};
use matchops_core::{DataStore, Result, StoreError};
use matchops_storage_kv::{KvAdapter, LocalDataStore, MemoryKvAdapter};

use crate::migration::{MigrationDirection, MigrationEngine, KEY_MIGRATION_IN_PROGRESS};
use crate::synced::SyncedDataStore;

#[derive(Debug, Clone, Copy)]
enum Scripted {
    Ok,
    Transient,
    Permanent,
}

struct MockExecutor {
    calls: StdMutex<Vec<(SyncEntityKind, String, SyncOp)>>,
    completions: AtomicUsize,
    script: StdMutex<VecDeque<Scripted>>,
    delay: Duration,
}

impl MockExecutor {
    fn new() -> Self {
        Self {
            calls: StdMutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            script: StdMutex::new(VecDeque::new()),
            delay: Duration::ZERO,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn push_script(&self, outcomes: &[Scripted]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn applied_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl SyncExecutor for MockExecutor {
    async fn apply(&self, entry: &SyncQueueEntry) -> Result<SyncApplyOutcome> {
        self.calls.lock().unwrap().push((
            entry.entity_type,
            entry.entity_id.clone(),
            entry.op,
        ));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Scripted::Ok);
        let result = match outcome {
            Scripted::Ok => Ok(SyncApplyOutcome::Applied),
            Scripted::Transient => Err(StoreError::Network("scripted outage".into())),
            Scripted::Permanent => Err(StoreError::Validation("scripted rejection".into())),
        };
        if result.is_ok() {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Poll until `predicate` holds or the timeout elapses.
async fn wait_until<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn synced_store(connectivity: Connectivity) -> SyncedDataStore {
    SyncedDataStore::new(Arc::new(MemoryKvAdapter::new()), connectivity)
}

fn status_recorder(store: &SyncedDataStore) -> (Arc<StdMutex<Vec<SyncStatus>>>, crate::SyncStatusSubscription) {
    let seen: Arc<StdMutex<Vec<SyncStatus>>> = Arc::new(StdMutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let subscription = store.on_sync_status_change(move |status| {
        seen_clone.lock().unwrap().push(status.clone());
    });
    (seen, subscription)
}

// ── Engine ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn coalesced_to_nothing_means_executor_never_runs() {
    let store = synced_store(Connectivity::online());
    let executor = Arc::new(MockExecutor::new());
    store.set_executor(executor.clone()).await;

    let player = store
        .create_player(NewPlayer {
            name: "A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .update_player(
            &player.id,
            matchops_core::model::PlayerPatch {
                name: Some("B".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.delete_player(&player.id).await.unwrap();

    // create + update + delete reduces to the empty queue before the engine
    // ever starts.
    assert!(store.queue().is_empty().await.unwrap());

    store.start_sync().await;
    let idle = wait_until(
        || store.sync_status().state == SyncEngineState::Idle,
        Duration::from_secs(2),
    )
    .await;
    assert!(idle);
    assert_eq!(executor.call_count(), 0);
    store.stop_sync().await;
}

#[tokio::test]
async fn offline_buffering_then_fifo_drain() {
    let connectivity = Connectivity::new(false);
    let store = synced_store(connectivity.clone());
    let executor = Arc::new(MockExecutor::new());
    store.set_executor(executor.clone()).await;
    let (seen, _subscription) = status_recorder(&store);

    store.start_sync().await;
    assert!(
        wait_until(
            || store.sync_status().state == SyncEngineState::Paused,
            Duration::from_secs(2),
        )
        .await
    );

    let a = store
        .create_player(NewPlayer {
            name: "A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let b = store
        .create_team(NewTeam {
            name: "Eagles".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let c = store
        .create_season(NewSeason {
            name: "Premier".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(store.queue().entries().await.unwrap().len(), 3);
    assert_eq!(store.sync_status().state, SyncEngineState::Paused);

    connectivity.set_online(true);
    assert!(
        wait_until(
            || executor.completions.load(Ordering::SeqCst) == 3,
            Duration::from_secs(5),
        )
        .await
    );
    assert!(
        wait_until(
            || store.sync_status().state == SyncEngineState::Idle,
            Duration::from_secs(2),
        )
        .await
    );

    // FIFO modulo coalescing: drain order equals enqueue order.
    assert_eq!(executor.applied_ids(), vec![a.id, b.id, c.id]);

    let states: Vec<SyncEngineState> = seen.lock().unwrap().iter().map(|s| s.state).collect();
    assert!(states.contains(&SyncEngineState::Paused));
    assert!(states.contains(&SyncEngineState::Syncing));
    assert!(states.contains(&SyncEngineState::Idle));
    assert!(store.sync_status().last_synced_at.is_some());

    store.stop_sync().await;
}

#[tokio::test]
async fn stop_aborts_in_flight_work_and_leaves_queue_unchanged() {
    let store = synced_store(Connectivity::online());
    let executor = Arc::new(MockExecutor::slow(Duration::from_secs(30)));
    store.set_executor(executor.clone()).await;

    store
        .create_player(NewPlayer {
            name: "A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.start_sync().await;

    // Wait until the executor got the entry, then stop mid-flight.
    assert!(wait_until(|| executor.call_count() == 1, Duration::from_secs(2)).await);
    store.stop_sync().await;

    assert_eq!(store.sync_status().state, SyncEngineState::Stopped);
    assert_eq!(executor.completions.load(Ordering::SeqCst), 0);
    assert_eq!(store.queue().entries().await.unwrap().len(), 1);

    // Stopped engine schedules nothing further.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn transient_failure_schedules_retry_with_backoff() {
    let store = synced_store(Connectivity::online());
    let executor = Arc::new(MockExecutor::new());
    executor.push_script(&[Scripted::Transient]);
    store.set_executor(executor.clone()).await;

    store
        .create_player(NewPlayer {
            name: "A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.start_sync().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let attempts = store
            .queue()
            .entries()
            .await
            .unwrap()
            .first()
            .map(|e| e.attempts)
            .unwrap_or(0);
        if attempts == 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "retry was never recorded"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let entries = store.queue().entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts, 1);
    assert!(entries[0].next_attempt_at.is_some());
    assert!(entries[0].last_error.as_deref().unwrap().contains("scripted outage"));

    let stats = store.queue().stats().await.unwrap();
    assert_eq!(stats.failed_count, 1);

    store.stop_sync().await;
}

#[tokio::test]
async fn permanent_failure_is_surfaced_and_dropped() {
    let store = synced_store(Connectivity::online());
    let executor = Arc::new(MockExecutor::new());
    executor.push_script(&[Scripted::Permanent]);
    store.set_executor(executor.clone()).await;

    store
        .create_player(NewPlayer {
            name: "A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.start_sync().await;

    assert!(
        wait_until(
            || store.sync_status().state == SyncEngineState::Error,
            Duration::from_secs(3),
        )
        .await
    );
    let status = store.sync_status();
    assert!(status.last_error.as_deref().unwrap().contains("scripted rejection"));
    assert!(store.queue().is_empty().await.unwrap());
    store.stop_sync().await;
}

// ── SyncedDataStore ──────────────────────────────────────────────────────

#[tokio::test]
async fn timer_state_is_never_enqueued() {
    let store = synced_store(Connectivity::online());
    store
        .save_timer_state(TimerState {
            game_id: "game_1".into(),
            time_elapsed_in_seconds: 10,
            timestamp: 1,
            was_running: Some(true),
        })
        .await
        .unwrap();
    store.clear_timer_state().await.unwrap();
    assert!(store.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn settings_noop_save_skips_the_queue() {
    let store = synced_store(Connectivity::online());
    let current = store.get_settings().await.unwrap();
    store.save_settings(current).await.unwrap();
    assert!(store.queue().is_empty().await.unwrap());

    store
        .update_settings(SettingsPatch {
            language: Some("fi".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(store.queue().entries().await.unwrap().len(), 1);

    // Saving the identical value again produces no further traffic.
    let unchanged = store.get_settings().await.unwrap();
    store.save_settings(unchanged).await.unwrap();
    assert_eq!(store.queue().entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn warmup_save_normalizes_before_local_write_and_enqueue() {
    let store = synced_store(Connectivity::online());
    let plan = WarmupPlan {
        id: "default".into(),
        version: 2,
        last_modified: "2020-01-01T00:00:00Z".into(),
        is_default: true,
        sections: vec![WarmupSection {
            id: "s1".into(),
            title: "Passing".into(),
            duration_minutes: None,
            activities: vec![],
        }],
        created_at: "2020-01-01T00:00:00Z".into(),
        updated_at: "2020-01-01T00:00:00Z".into(),
    };

    let saved = store.save_warmup_plan(plan).await.unwrap();
    assert!(!saved.is_default);
    assert!(saved.last_modified.as_str() > "2020-01-01T00:00:00Z");

    let entries = store.queue().entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, SyncEntityKind::WarmupPlan);
    assert_eq!(entries[0].op, SyncOp::Create);
    assert_eq!(entries[0].data.as_ref().unwrap()["isDefault"], false);
}

#[tokio::test]
async fn game_writes_enqueue_one_update_per_game() {
    let store = synced_store(Connectivity::online());
    let game = store
        .create_game(NewGame {
            opponent_name: "Rovers".into(),
            game_date: "2026-05-01".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let games = store.get_games().await.unwrap();
    store.save_all_games(games).await.unwrap();

    // create coalesced with the follow-up update: one pending create with
    // the latest data.
    let entries = store.queue().entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, SyncEntityKind::Game);
    assert_eq!(entries[0].op, SyncOp::Create);
    assert_eq!(entries[0].entity_id, game.id);
}

struct EnqueueFailingKv {
    inner: MemoryKvAdapter,
}

#[async_trait]
impl KvAdapter for EnqueueFailingKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if key == matchops_storage_kv::keys::KEY_SYNC_QUEUE {
            return Err(StoreError::Backend("queue write refused".into()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn enqueue_failure_never_fails_the_local_write() {
    let kv = Arc::new(EnqueueFailingKv {
        inner: MemoryKvAdapter::new(),
    });
    let store = SyncedDataStore::new(kv, Connectivity::online());

    let player = store
        .create_player(NewPlayer {
            name: "Alice".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(store.get_players().await.unwrap(), vec![player]);
    assert!(store.queue().is_empty().await.unwrap());
}

#[tokio::test]
async fn clear_all_user_data_stops_engine_and_wipes_everything() {
    let store = synced_store(Connectivity::online());
    store
        .create_player(NewPlayer {
            name: "Alice".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store.start_sync().await;

    store.clear_all_user_data().await.unwrap();
    assert_eq!(store.sync_status().state, SyncEngineState::Stopped);
    assert!(store.queue().is_empty().await.unwrap());
    assert!(store.get_players().await.unwrap().is_empty());
}

// ── Migration ────────────────────────────────────────────────────────────

async fn populated_local_store() -> Arc<LocalDataStore> {
    let store = Arc::new(LocalDataStore::new(Arc::new(MemoryKvAdapter::new())));
    let player = store
        .create_player(NewPlayer {
            name: "Alice".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .create_team(NewTeam {
            name: "Eagles".into(),
            game_type: Some("soccer".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .create_season(NewSeason {
            name: "Premier".into(),
            start_date: Some("2025-10-15".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .create_tournament(NewTournament {
            name: "Spring Cup".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .add_personnel_member(NewPersonnelMember {
            name: "Coach Kim".into(),
            role: PersonnelRole::HeadCoach,
            email: None,
            phone: None,
            certifications: vec![],
            notes: None,
        })
        .await
        .unwrap();
    store
        .create_game(NewGame {
            opponent_name: "Rovers".into(),
            game_date: "2026-05-01".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    store
        .add_player_adjustment(NewPlayerAdjustment {
            player_id: player.id.clone(),
            games_played_delta: 2,
            goals_delta: 1,
            assists_delta: 0,
            note: None,
        })
        .await
        .unwrap();
    store
}

fn migration(
    source: Arc<LocalDataStore>,
    destination: Arc<LocalDataStore>,
) -> (MigrationEngine, Arc<MemoryKvAdapter>, Arc<MemoryKvAdapter>) {
    let flags = Arc::new(MemoryKvAdapter::new());
    let session = Arc::new(MemoryKvAdapter::new());
    let engine = MigrationEngine::new(
        MigrationDirection::LocalToCloud,
        source,
        destination,
        flags.clone(),
        session.clone(),
    );
    (engine, flags, session)
}

#[tokio::test]
async fn migration_copies_every_collection() {
    let source = populated_local_store().await;
    let destination = Arc::new(LocalDataStore::new(Arc::new(MemoryKvAdapter::new())));
    let (engine, _flags, session) = migration(source.clone(), destination.clone());

    let progress_steps: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
    let steps_clone = Arc::clone(&progress_steps);
    engine.on_progress(move |progress| {
        steps_clone.lock().unwrap().push(progress.step.clone());
    });

    let report = engine.run("user1").await.unwrap();
    assert_eq!(report.copied["player"], 1);
    assert_eq!(report.copied["game"], 1);
    assert_eq!(report.copied["playerAdjustment"], 1);

    assert_eq!(
        destination.get_players().await.unwrap(),
        source.get_players().await.unwrap()
    );
    assert_eq!(
        destination.get_games().await.unwrap(),
        source.get_games().await.unwrap()
    );
    assert_eq!(
        destination.get_all_personnel().await.unwrap(),
        source.get_all_personnel().await.unwrap()
    );

    // In-progress flag cleared only on success.
    assert!(session.get(KEY_MIGRATION_IN_PROGRESS).await.unwrap().is_none());
    assert!(engine.has_completed("user1").await.unwrap());
    assert_eq!(progress_steps.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn migration_refuses_rerun_until_flag_cleared_and_is_idempotent() {
    let source = populated_local_store().await;
    let destination = Arc::new(LocalDataStore::new(Arc::new(MemoryKvAdapter::new())));
    let (engine, _flags, _session) = migration(source.clone(), destination.clone());

    engine.run("user1").await.unwrap();
    let err = engine.run("user1").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION");

    let players_before = destination.get_players().await.unwrap();
    let games_before = destination.get_games().await.unwrap();

    engine.clear_completion_flag("user1").await.unwrap();
    engine.run("user1").await.unwrap();

    assert_eq!(destination.get_players().await.unwrap(), players_before);
    assert_eq!(destination.get_games().await.unwrap(), games_before);
}

#[tokio::test]
async fn fatal_failure_rolls_destination_back_to_its_snapshot() {
    let source = populated_local_store().await;
    let destination = Arc::new(LocalDataStore::new(Arc::new(MemoryKvAdapter::new())));
    // The destination already owns the personnel name the source carries;
    // the personnel step collides fatally after earlier steps copied data.
    let pre_existing = destination
        .add_personnel_member(NewPersonnelMember {
            name: "coach kim".into(),
            role: PersonnelRole::TeamManager,
            email: None,
            phone: None,
            certifications: vec![],
            notes: None,
        })
        .await
        .unwrap();

    let (engine, _flags, session) = migration(source.clone(), destination.clone());
    let err = engine.run("user1").await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_EXISTS");

    // Rolled back: nothing the run copied survives, the original row does.
    assert!(destination.get_players().await.unwrap().is_empty());
    assert!(destination.get_teams(true).await.unwrap().is_empty());
    assert!(destination.get_games().await.unwrap().is_empty());
    let personnel = destination.get_all_personnel().await.unwrap();
    assert_eq!(personnel.len(), 1);
    assert_eq!(personnel[0].id, pre_existing.id);

    // Interrupted-run flag stays set for the UI to notice.
    assert!(session.get(KEY_MIGRATION_IN_PROGRESS).await.unwrap().is_some());
    assert!(!engine.has_completed("user1").await.unwrap());
}
