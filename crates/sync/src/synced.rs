//! SyncedDataStore: the local-first wrapper. Reads hit local storage only;
//! writes commit locally, then enqueue a remote op. A queue failure is
//! logged and never fails the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::Serialize;

use matchops_core::connectivity::Connectivity;
use matchops_core::model::{
    now_iso, AdjustmentPatch, AppSettings, AppState, GameEvent, NewGame, NewPersonnelMember,
    NewPlayer, NewPlayerAdjustment, NewSeason, NewTeam, NewTournament, PersonnelMember,
    PersonnelPatch, Player, PlayerAdjustment, PlayerPatch, Season, SettingsPatch, Team, TeamPatch,
    TeamRosterEntry, TimerState, Tournament, WarmupPlan, WARMUP_PLAN_ID,
};
use matchops_core::sync::{SyncEntityKind, SyncExecutor, SyncOp, SyncQueueEntry, SyncStatus};
use matchops_core::{BackendKind, DataStore, Result};
use matchops_storage_kv::{KvAdapter, LocalDataStore, SyncQueue};

use crate::engine::{SyncEngine, SyncStatusSubscription};

/// Queue entity id of the settings singleton.
const SETTINGS_ENTITY_ID: &str = "settings";

pub struct SyncedDataStore {
    local: Arc<LocalDataStore>,
    queue: Arc<SyncQueue>,
    engine: Arc<SyncEngine>,
}

impl SyncedDataStore {
    pub fn new(kv: Arc<dyn KvAdapter>, connectivity: Connectivity) -> Self {
        let local = Arc::new(LocalDataStore::new(Arc::clone(&kv)));
        let queue = Arc::new(SyncQueue::new(kv));
        let engine = Arc::new(SyncEngine::new(Arc::clone(&queue), connectivity));
        Self {
            local,
            queue,
            engine,
        }
    }

    pub fn queue(&self) -> Arc<SyncQueue> {
        Arc::clone(&self.queue)
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub async fn set_executor(&self, executor: Arc<dyn SyncExecutor>) {
        self.engine.set_executor(executor).await;
    }

    pub async fn start_sync(&self) {
        self.engine.start().await;
    }

    pub async fn stop_sync(&self) {
        self.engine.stop().await;
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.engine.status()
    }

    pub fn on_sync_status_change(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SyncStatusSubscription {
        self.engine.on_status_change(listener)
    }

    /// Stop the engine, drop all pending sync work, wipe the local store.
    pub async fn clear_all_user_data(&self) -> Result<()> {
        self.engine.stop().await;
        self.queue.clear().await?;
        self.local.clear_all_data().await
    }

    fn to_json<T: Serialize>(value: &T) -> Option<serde_json::Value> {
        match serde_json::to_value(value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("sync payload serialization failed: {err}");
                None
            }
        }
    }

    async fn enqueue(
        &self,
        entity_type: SyncEntityKind,
        entity_id: &str,
        op: SyncOp,
        data: Option<serde_json::Value>,
    ) {
        let entry = SyncQueueEntry::new(entity_type, entity_id, op, data);
        match self.queue.enqueue(entry).await {
            Ok(()) => self.engine.poke(),
            Err(err) => {
                warn!("sync enqueue failed for {entity_type:?} {entity_id}: {err}");
            }
        }
    }
}

#[async_trait]
impl DataStore for SyncedDataStore {
    // ── Lifecycle ────────────────────────────────────────────────────────

    async fn initialize(&self) -> Result<()> {
        self.local.initialize().await
    }

    async fn close(&self) {
        self.engine.stop().await;
        self.local.close().await;
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Synced
    }

    async fn is_available(&self) -> bool {
        self.local.is_available().await
    }

    // ── Players ──────────────────────────────────────────────────────────

    async fn get_players(&self) -> Result<Vec<Player>> {
        self.local.get_players().await
    }

    async fn create_player(&self, new: NewPlayer) -> Result<Player> {
        let player = self.local.create_player(new).await?;
        self.enqueue(
            SyncEntityKind::Player,
            &player.id,
            SyncOp::Create,
            Self::to_json(&player),
        )
        .await;
        Ok(player)
    }

    async fn update_player(&self, id: &str, patch: PlayerPatch) -> Result<Option<Player>> {
        let updated = self.local.update_player(id, patch).await?;
        if let Some(player) = &updated {
            self.enqueue(
                SyncEntityKind::Player,
                id,
                SyncOp::Update,
                Self::to_json(player),
            )
            .await;
        }
        Ok(updated)
    }

    async fn delete_player(&self, id: &str) -> Result<bool> {
        let deleted = self.local.delete_player(id).await?;
        if deleted {
            self.enqueue(SyncEntityKind::Player, id, SyncOp::Delete, None)
                .await;
        }
        Ok(deleted)
    }

    async fn upsert_player(&self, player: Player) -> Result<Player> {
        let player = self.local.upsert_player(player).await?;
        self.enqueue(
            SyncEntityKind::Player,
            &player.id,
            SyncOp::Create,
            Self::to_json(&player),
        )
        .await;
        Ok(player)
    }

    // ── Teams ────────────────────────────────────────────────────────────

    async fn get_teams(&self, include_archived: bool) -> Result<Vec<Team>> {
        self.local.get_teams(include_archived).await
    }

    async fn get_team_by_id(&self, id: &str) -> Result<Option<Team>> {
        self.local.get_team_by_id(id).await
    }

    async fn create_team(&self, new: NewTeam) -> Result<Team> {
        let team = self.local.create_team(new).await?;
        self.enqueue(
            SyncEntityKind::Team,
            &team.id,
            SyncOp::Create,
            Self::to_json(&team),
        )
        .await;
        Ok(team)
    }

    async fn update_team(&self, id: &str, patch: TeamPatch) -> Result<Option<Team>> {
        let updated = self.local.update_team(id, patch).await?;
        if let Some(team) = &updated {
            self.enqueue(SyncEntityKind::Team, id, SyncOp::Update, Self::to_json(team))
                .await;
        }
        Ok(updated)
    }

    async fn delete_team(&self, id: &str) -> Result<bool> {
        let deleted = self.local.delete_team(id).await?;
        if deleted {
            self.enqueue(SyncEntityKind::Team, id, SyncOp::Delete, None)
                .await;
        }
        Ok(deleted)
    }

    async fn upsert_team(&self, team: Team) -> Result<Team> {
        let team = self.local.upsert_team(team).await?;
        self.enqueue(
            SyncEntityKind::Team,
            &team.id,
            SyncOp::Create,
            Self::to_json(&team),
        )
        .await;
        Ok(team)
    }

    // ── Team rosters ─────────────────────────────────────────────────────

    async fn get_team_roster(&self, team_id: &str) -> Result<Vec<TeamRosterEntry>> {
        self.local.get_team_roster(team_id).await
    }

    async fn set_team_roster(&self, team_id: &str, roster: Vec<TeamRosterEntry>) -> Result<()> {
        self.local.set_team_roster(team_id, roster).await?;
        let saved = self.local.get_team_roster(team_id).await?;
        self.enqueue(
            SyncEntityKind::TeamRoster,
            team_id,
            SyncOp::Create,
            Self::to_json(&saved),
        )
        .await;
        Ok(())
    }

    async fn get_all_team_rosters(&self) -> Result<HashMap<String, Vec<TeamRosterEntry>>> {
        self.local.get_all_team_rosters().await
    }

    // ── Seasons ──────────────────────────────────────────────────────────

    async fn get_seasons(&self, include_archived: bool) -> Result<Vec<Season>> {
        self.local.get_seasons(include_archived).await
    }

    async fn create_season(&self, new: NewSeason) -> Result<Season> {
        let season = self.local.create_season(new).await?;
        self.enqueue(
            SyncEntityKind::Season,
            &season.id,
            SyncOp::Create,
            Self::to_json(&season),
        )
        .await;
        Ok(season)
    }

    async fn update_season(&self, season: Season) -> Result<Option<Season>> {
        let updated = self.local.update_season(season).await?;
        if let Some(season) = &updated {
            self.enqueue(
                SyncEntityKind::Season,
                &season.id,
                SyncOp::Update,
                Self::to_json(season),
            )
            .await;
        }
        Ok(updated)
    }

    async fn delete_season(&self, id: &str) -> Result<bool> {
        let deleted = self.local.delete_season(id).await?;
        if deleted {
            self.enqueue(SyncEntityKind::Season, id, SyncOp::Delete, None)
                .await;
        }
        Ok(deleted)
    }

    async fn upsert_season(&self, season: Season) -> Result<Season> {
        let season = self.local.upsert_season(season).await?;
        self.enqueue(
            SyncEntityKind::Season,
            &season.id,
            SyncOp::Create,
            Self::to_json(&season),
        )
        .await;
        Ok(season)
    }

    // ── Tournaments ──────────────────────────────────────────────────────

    async fn get_tournaments(&self, include_archived: bool) -> Result<Vec<Tournament>> {
        self.local.get_tournaments(include_archived).await
    }

    async fn create_tournament(&self, new: NewTournament) -> Result<Tournament> {
        let tournament = self.local.create_tournament(new).await?;
        self.enqueue(
            SyncEntityKind::Tournament,
            &tournament.id,
            SyncOp::Create,
            Self::to_json(&tournament),
        )
        .await;
        Ok(tournament)
    }

    async fn update_tournament(&self, tournament: Tournament) -> Result<Option<Tournament>> {
        let updated = self.local.update_tournament(tournament).await?;
        if let Some(tournament) = &updated {
            self.enqueue(
                SyncEntityKind::Tournament,
                &tournament.id,
                SyncOp::Update,
                Self::to_json(tournament),
            )
            .await;
        }
        Ok(updated)
    }

    async fn delete_tournament(&self, id: &str) -> Result<bool> {
        let deleted = self.local.delete_tournament(id).await?;
        if deleted {
            self.enqueue(SyncEntityKind::Tournament, id, SyncOp::Delete, None)
                .await;
        }
        Ok(deleted)
    }

    async fn upsert_tournament(&self, tournament: Tournament) -> Result<Tournament> {
        let tournament = self.local.upsert_tournament(tournament).await?;
        self.enqueue(
            SyncEntityKind::Tournament,
            &tournament.id,
            SyncOp::Create,
            Self::to_json(&tournament),
        )
        .await;
        Ok(tournament)
    }

    // ── Personnel ────────────────────────────────────────────────────────

    async fn get_all_personnel(&self) -> Result<Vec<PersonnelMember>> {
        self.local.get_all_personnel().await
    }

    async fn get_personnel_by_id(&self, id: &str) -> Result<Option<PersonnelMember>> {
        self.local.get_personnel_by_id(id).await
    }

    async fn add_personnel_member(&self, new: NewPersonnelMember) -> Result<PersonnelMember> {
        let member = self.local.add_personnel_member(new).await?;
        self.enqueue(
            SyncEntityKind::Personnel,
            &member.id,
            SyncOp::Create,
            Self::to_json(&member),
        )
        .await;
        Ok(member)
    }

    async fn update_personnel_member(
        &self,
        id: &str,
        patch: PersonnelPatch,
    ) -> Result<Option<PersonnelMember>> {
        let updated = self.local.update_personnel_member(id, patch).await?;
        if let Some(member) = &updated {
            self.enqueue(
                SyncEntityKind::Personnel,
                id,
                SyncOp::Update,
                Self::to_json(member),
            )
            .await;
        }
        Ok(updated)
    }

    async fn remove_personnel_member(&self, id: &str) -> Result<bool> {
        let removed = self.local.remove_personnel_member(id).await?;
        if removed {
            self.enqueue(SyncEntityKind::Personnel, id, SyncOp::Delete, None)
                .await;
        }
        Ok(removed)
    }

    async fn upsert_personnel_member(&self, member: PersonnelMember) -> Result<PersonnelMember> {
        let member = self.local.upsert_personnel_member(member).await?;
        self.enqueue(
            SyncEntityKind::Personnel,
            &member.id,
            SyncOp::Create,
            Self::to_json(&member),
        )
        .await;
        Ok(member)
    }

    // ── Games ────────────────────────────────────────────────────────────

    async fn get_games(&self) -> Result<HashMap<String, AppState>> {
        self.local.get_games().await
    }

    async fn get_game_by_id(&self, id: &str) -> Result<Option<AppState>> {
        self.local.get_game_by_id(id).await
    }

    async fn create_game(&self, new: NewGame) -> Result<AppState> {
        let game = self.local.create_game(new).await?;
        self.enqueue(
            SyncEntityKind::Game,
            &game.id,
            SyncOp::Create,
            Self::to_json(&game),
        )
        .await;
        Ok(game)
    }

    async fn save_game(&self, id: &str, state: AppState) -> Result<AppState> {
        let saved = self.local.save_game(id, state).await?;
        self.enqueue(SyncEntityKind::Game, id, SyncOp::Update, Self::to_json(&saved))
            .await;
        Ok(saved)
    }

    async fn save_all_games(&self, games: HashMap<String, AppState>) -> Result<()> {
        self.local.save_all_games(games.clone()).await?;
        for (id, mut state) in games {
            state.id = id.clone();
            self.enqueue(SyncEntityKind::Game, &id, SyncOp::Update, Self::to_json(&state))
                .await;
        }
        Ok(())
    }

    async fn delete_game(&self, id: &str) -> Result<bool> {
        let deleted = self.local.delete_game(id).await?;
        if deleted {
            self.enqueue(SyncEntityKind::Game, id, SyncOp::Delete, None)
                .await;
        }
        Ok(deleted)
    }

    // ── Game events ──────────────────────────────────────────────────────

    async fn add_game_event(&self, game_id: &str, event: GameEvent) -> Result<Option<AppState>> {
        let updated = self.local.add_game_event(game_id, event).await?;
        if let Some(state) = &updated {
            self.enqueue(
                SyncEntityKind::Game,
                game_id,
                SyncOp::Update,
                Self::to_json(state),
            )
            .await;
        }
        Ok(updated)
    }

    async fn update_game_event(
        &self,
        game_id: &str,
        index: usize,
        event: GameEvent,
    ) -> Result<Option<AppState>> {
        let updated = self.local.update_game_event(game_id, index, event).await?;
        if let Some(state) = &updated {
            self.enqueue(
                SyncEntityKind::Game,
                game_id,
                SyncOp::Update,
                Self::to_json(state),
            )
            .await;
        }
        Ok(updated)
    }

    async fn remove_game_event(&self, game_id: &str, index: usize) -> Result<Option<AppState>> {
        let updated = self.local.remove_game_event(game_id, index).await?;
        if let Some(state) = &updated {
            self.enqueue(
                SyncEntityKind::Game,
                game_id,
                SyncOp::Update,
                Self::to_json(state),
            )
            .await;
        }
        Ok(updated)
    }

    // ── Player adjustments ───────────────────────────────────────────────

    async fn get_player_adjustments(&self, player_id: &str) -> Result<Vec<PlayerAdjustment>> {
        self.local.get_player_adjustments(player_id).await
    }

    async fn add_player_adjustment(&self, new: NewPlayerAdjustment) -> Result<PlayerAdjustment> {
        let adjustment = self.local.add_player_adjustment(new).await?;
        self.enqueue(
            SyncEntityKind::PlayerAdjustment,
            &adjustment.id,
            SyncOp::Create,
            Self::to_json(&adjustment),
        )
        .await;
        Ok(adjustment)
    }

    async fn update_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
        patch: AdjustmentPatch,
    ) -> Result<Option<PlayerAdjustment>> {
        let updated = self
            .local
            .update_player_adjustment(player_id, adjustment_id, patch)
            .await?;
        if let Some(adjustment) = &updated {
            self.enqueue(
                SyncEntityKind::PlayerAdjustment,
                adjustment_id,
                SyncOp::Update,
                Self::to_json(adjustment),
            )
            .await;
        }
        Ok(updated)
    }

    async fn delete_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
    ) -> Result<bool> {
        let deleted = self
            .local
            .delete_player_adjustment(player_id, adjustment_id)
            .await?;
        if deleted {
            // The adjustment id alone does not identify the owning player
            // remotely, so the delete payload carries it.
            self.enqueue(
                SyncEntityKind::PlayerAdjustment,
                adjustment_id,
                SyncOp::Delete,
                Some(serde_json::json!({ "playerId": player_id })),
            )
            .await;
        }
        Ok(deleted)
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: PlayerAdjustment,
    ) -> Result<PlayerAdjustment> {
        let adjustment = self.local.upsert_player_adjustment(adjustment).await?;
        self.enqueue(
            SyncEntityKind::PlayerAdjustment,
            &adjustment.id,
            SyncOp::Create,
            Self::to_json(&adjustment),
        )
        .await;
        Ok(adjustment)
    }

    // ── Warmup plan ──────────────────────────────────────────────────────

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>> {
        self.local.get_warmup_plan().await
    }

    async fn save_warmup_plan(&self, mut plan: WarmupPlan) -> Result<WarmupPlan> {
        plan.last_modified = now_iso();
        plan.updated_at = plan.last_modified.clone();
        plan.is_default = false;
        let saved = self.local.save_warmup_plan(plan).await?;
        self.enqueue(
            SyncEntityKind::WarmupPlan,
            WARMUP_PLAN_ID,
            SyncOp::Create,
            Self::to_json(&saved),
        )
        .await;
        Ok(saved)
    }

    async fn delete_warmup_plan(&self) -> Result<bool> {
        let deleted = self.local.delete_warmup_plan().await?;
        if deleted {
            self.enqueue(
                SyncEntityKind::WarmupPlan,
                WARMUP_PLAN_ID,
                SyncOp::Delete,
                None,
            )
            .await;
        }
        Ok(deleted)
    }

    // ── Settings ─────────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<AppSettings> {
        self.local.get_settings().await
    }

    async fn save_settings(&self, settings: AppSettings) -> Result<AppSettings> {
        let current = self.local.get_settings().await?;
        let saved = self.local.save_settings(settings).await?;
        // Canonical comparison; a no-op save produces no sync traffic.
        if serde_json::to_value(&current).ok() != serde_json::to_value(&saved).ok() {
            self.enqueue(
                SyncEntityKind::Settings,
                SETTINGS_ENTITY_ID,
                SyncOp::Create,
                Self::to_json(&saved),
            )
            .await;
        }
        Ok(saved)
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<AppSettings> {
        let current = self.local.get_settings().await?;
        let updated = self.local.update_settings(patch).await?;
        if serde_json::to_value(&current).ok() != serde_json::to_value(&updated).ok() {
            self.enqueue(
                SyncEntityKind::Settings,
                SETTINGS_ENTITY_ID,
                SyncOp::Create,
                Self::to_json(&updated),
            )
            .await;
        }
        Ok(updated)
    }

    // ── Timer state: local-only, never enqueued ──────────────────────────

    async fn get_timer_state(&self) -> Result<Option<TimerState>> {
        self.local.get_timer_state().await
    }

    async fn save_timer_state(&self, state: TimerState) -> Result<()> {
        self.local.save_timer_state(state).await
    }

    async fn clear_timer_state(&self) -> Result<()> {
        self.local.clear_timer_state().await
    }
}
