//! The uniform DataStore contract satisfied by the local, remote, and
//! synced-wrapper implementations.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{
    AdjustmentPatch, AppSettings, AppState, GameEvent, NewGame, NewPersonnelMember, NewPlayer,
    NewPlayerAdjustment, NewSeason, NewTeam, NewTournament, PersonnelMember, PersonnelPatch,
    Player, PlayerAdjustment, PlayerPatch, Season, SettingsPatch, Team, TeamPatch,
    TeamRosterEntry, TimerState, Tournament, WarmupPlan,
};

/// Which backend a store instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Supabase,
    Synced,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Supabase => "supabase",
            Self::Synced => "synced",
        }
    }
}

/// Uniform data-store contract.
///
/// "Not found" is represented as `Ok(None)` (or `Ok(false)` for deletes),
/// never as an error. All other failures surface as [`crate::StoreError`]
/// with a stable code.
#[async_trait]
pub trait DataStore: Send + Sync {
    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Idempotent; must resolve before any other call.
    async fn initialize(&self) -> Result<()>;
    /// Best-effort; must not fail the caller.
    async fn close(&self);
    fn backend_kind(&self) -> BackendKind;
    async fn is_available(&self) -> bool;

    // ── Players (master roster) ──────────────────────────────────────────

    async fn get_players(&self) -> Result<Vec<Player>>;
    async fn create_player(&self, new: NewPlayer) -> Result<Player>;
    async fn update_player(&self, id: &str, patch: PlayerPatch) -> Result<Option<Player>>;
    async fn delete_player(&self, id: &str) -> Result<bool>;
    async fn upsert_player(&self, player: Player) -> Result<Player>;

    // ── Teams ────────────────────────────────────────────────────────────

    async fn get_teams(&self, include_archived: bool) -> Result<Vec<Team>>;
    async fn get_team_by_id(&self, id: &str) -> Result<Option<Team>>;
    async fn create_team(&self, new: NewTeam) -> Result<Team>;
    async fn update_team(&self, id: &str, patch: TeamPatch) -> Result<Option<Team>>;
    async fn delete_team(&self, id: &str) -> Result<bool>;
    async fn upsert_team(&self, team: Team) -> Result<Team>;

    // ── Team rosters ─────────────────────────────────────────────────────

    async fn get_team_roster(&self, team_id: &str) -> Result<Vec<TeamRosterEntry>>;
    async fn set_team_roster(&self, team_id: &str, roster: Vec<TeamRosterEntry>) -> Result<()>;
    async fn get_all_team_rosters(&self) -> Result<HashMap<String, Vec<TeamRosterEntry>>>;

    // ── Seasons ──────────────────────────────────────────────────────────

    async fn get_seasons(&self, include_archived: bool) -> Result<Vec<Season>>;
    async fn create_season(&self, new: NewSeason) -> Result<Season>;
    /// Full-entity update; `Ok(None)` when the id is absent.
    async fn update_season(&self, season: Season) -> Result<Option<Season>>;
    async fn delete_season(&self, id: &str) -> Result<bool>;
    async fn upsert_season(&self, season: Season) -> Result<Season>;

    // ── Tournaments ──────────────────────────────────────────────────────

    async fn get_tournaments(&self, include_archived: bool) -> Result<Vec<Tournament>>;
    async fn create_tournament(&self, new: NewTournament) -> Result<Tournament>;
    async fn update_tournament(&self, tournament: Tournament) -> Result<Option<Tournament>>;
    async fn delete_tournament(&self, id: &str) -> Result<bool>;
    async fn upsert_tournament(&self, tournament: Tournament) -> Result<Tournament>;

    // ── Personnel ────────────────────────────────────────────────────────

    async fn get_all_personnel(&self) -> Result<Vec<PersonnelMember>>;
    async fn get_personnel_by_id(&self, id: &str) -> Result<Option<PersonnelMember>>;
    async fn add_personnel_member(&self, new: NewPersonnelMember) -> Result<PersonnelMember>;
    async fn update_personnel_member(
        &self,
        id: &str,
        patch: PersonnelPatch,
    ) -> Result<Option<PersonnelMember>>;
    /// Cascades: atomically removes the member's references from every game.
    async fn remove_personnel_member(&self, id: &str) -> Result<bool>;
    async fn upsert_personnel_member(&self, member: PersonnelMember) -> Result<PersonnelMember>;

    // ── Games ────────────────────────────────────────────────────────────

    async fn get_games(&self) -> Result<HashMap<String, AppState>>;
    async fn get_game_by_id(&self, id: &str) -> Result<Option<AppState>>;
    async fn create_game(&self, new: NewGame) -> Result<AppState>;
    async fn save_game(&self, id: &str, state: AppState) -> Result<AppState>;
    async fn save_all_games(&self, games: HashMap<String, AppState>) -> Result<()>;
    async fn delete_game(&self, id: &str) -> Result<bool>;

    // ── Game events (index-based, contractual) ───────────────────────────

    async fn add_game_event(&self, game_id: &str, event: GameEvent) -> Result<Option<AppState>>;
    async fn update_game_event(
        &self,
        game_id: &str,
        index: usize,
        event: GameEvent,
    ) -> Result<Option<AppState>>;
    async fn remove_game_event(&self, game_id: &str, index: usize) -> Result<Option<AppState>>;

    // ── Player adjustments ───────────────────────────────────────────────

    async fn get_player_adjustments(&self, player_id: &str) -> Result<Vec<PlayerAdjustment>>;
    async fn add_player_adjustment(&self, new: NewPlayerAdjustment) -> Result<PlayerAdjustment>;
    async fn update_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
        patch: AdjustmentPatch,
    ) -> Result<Option<PlayerAdjustment>>;
    async fn delete_player_adjustment(&self, player_id: &str, adjustment_id: &str)
        -> Result<bool>;
    async fn upsert_player_adjustment(
        &self,
        adjustment: PlayerAdjustment,
    ) -> Result<PlayerAdjustment>;

    // ── Warmup plan ──────────────────────────────────────────────────────

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>>;
    async fn save_warmup_plan(&self, plan: WarmupPlan) -> Result<WarmupPlan>;
    async fn delete_warmup_plan(&self) -> Result<bool>;

    // ── Settings ─────────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<AppSettings>;
    async fn save_settings(&self, settings: AppSettings) -> Result<AppSettings>;
    async fn update_settings(&self, patch: SettingsPatch) -> Result<AppSettings>;

    // ── Timer state (local-only semantics) ───────────────────────────────

    async fn get_timer_state(&self) -> Result<Option<TimerState>>;
    async fn save_timer_state(&self, state: TimerState) -> Result<()>;
    async fn clear_timer_state(&self) -> Result<()>;
}
