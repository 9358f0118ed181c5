//! RemoteDataStore: the DataStore contract against the cloud relational
//! store, scoped per authenticated user (row-level authorization is enforced
//! by the backend).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use matchops_core::auth::AuthService;
use matchops_core::connectivity::Connectivity;
use matchops_core::model::{
    club_season_label, new_entity_id, normalized_name, now_iso, AdjustmentPatch, AppSettings,
    AppState, GameEvent, NewGame, NewPersonnelMember, NewPlayer, NewPlayerAdjustment, NewSeason,
    NewTeam, NewTournament, PersonnelMember, PersonnelPatch, Player, PlayerAdjustment,
    PlayerPatch, Season, SettingsPatch, Team, TeamPatch, TeamRosterEntry, TimerState, Tournament,
    WarmupPlan, DEFAULT_NUMBER_OF_PERIODS, DEFAULT_PERIOD_DURATION_MINUTES, WARMUP_PLAN_ID,
};
use matchops_core::{BackendKind, DataStore, Result, StoreError};

use crate::client::{eq, CloudClient};
use crate::retry::with_retry;
use crate::rows::{
    AdjustmentRow, GameRow, PersonnelRow, PlayerRow, SeasonRow, SettingsRow, TeamRosterRow,
    TeamRow, TournamentRow, WarmupPlanRow,
};

const PLAYERS_TABLE: &str = "players";
const TEAMS_TABLE: &str = "teams";
const TEAM_ROSTERS_TABLE: &str = "team_rosters";
const SEASONS_TABLE: &str = "seasons";
const TOURNAMENTS_TABLE: &str = "tournaments";
const PERSONNEL_TABLE: &str = "personnel";
const GAMES_TABLE: &str = "games";
const ADJUSTMENTS_TABLE: &str = "player_adjustments";
const WARMUP_PLANS_TABLE: &str = "warmup_plans";
const SETTINGS_TABLE: &str = "settings";

/// Server-side cascade procedure for personnel removal.
const PERSONNEL_CASCADE_RPC: &str = "remove_personnel_cascade";

fn order_newest_first() -> (String, String) {
    ("order".to_string(), "created_at.desc".to_string())
}

fn ensure_team_bindings(team: &Team) -> Result<()> {
    if team.bound_tournament_series_id.is_some() && team.bound_tournament_id.is_none() {
        return Err(StoreError::Validation(
            "a tournament series binding requires a tournament binding".into(),
        ));
    }
    Ok(())
}

fn ensure_unique_team(existing: &[Team], candidate: &Team, exclude_id: Option<&str>) -> Result<()> {
    let key = candidate.uniqueness_key();
    if existing
        .iter()
        .filter(|t| exclude_id != Some(t.id.as_str()))
        .any(|t| t.uniqueness_key() == key)
    {
        return Err(StoreError::already_exists("team", candidate.name.clone()));
    }
    Ok(())
}

fn ensure_unique_season(
    existing: &[Season],
    candidate: &Season,
    exclude_id: Option<&str>,
) -> Result<()> {
    let key = candidate.uniqueness_key();
    if existing
        .iter()
        .filter(|s| exclude_id != Some(s.id.as_str()))
        .any(|s| s.uniqueness_key() == key)
    {
        return Err(StoreError::already_exists("season", candidate.name.clone()));
    }
    Ok(())
}

fn ensure_unique_tournament(
    existing: &[Tournament],
    candidate: &Tournament,
    exclude_id: Option<&str>,
) -> Result<()> {
    let key = candidate.uniqueness_key();
    if existing
        .iter()
        .filter(|t| exclude_id != Some(t.id.as_str()))
        .any(|t| t.uniqueness_key() == key)
    {
        return Err(StoreError::already_exists(
            "tournament",
            candidate.name.clone(),
        ));
    }
    Ok(())
}

fn ensure_unique_personnel(
    existing: &[PersonnelMember],
    name: &str,
    exclude_id: Option<&str>,
) -> Result<()> {
    let folded = matchops_core::model::folded_name(name);
    if existing
        .iter()
        .filter(|p| exclude_id != Some(p.id.as_str()))
        .any(|p| matchops_core::model::folded_name(&p.name) == folded)
    {
        return Err(StoreError::already_exists("personnel", name.to_string()));
    }
    Ok(())
}

struct OpContext {
    user_id: String,
    token: String,
}

pub struct RemoteDataStore {
    client: CloudClient,
    auth: Arc<dyn AuthService>,
    connectivity: Connectivity,
    user_id: RwLock<Option<String>>,
    settings_cache: Mutex<Option<AppSettings>>,
    game_versions: Mutex<HashMap<String, i64>>,
    cancel: CancellationToken,
}

impl RemoteDataStore {
    pub fn new(client: CloudClient, auth: Arc<dyn AuthService>, connectivity: Connectivity) -> Self {
        Self {
            client,
            auth,
            connectivity,
            user_id: RwLock::new(None),
            settings_cache: Mutex::new(None),
            game_versions: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolve the per-operation context. Offline fails fast with `NETWORK`;
    /// a revoked or switched session fails with `AUTH`.
    async fn op_context(&self) -> Result<OpContext> {
        let cached = self
            .user_id
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotInitialized)?;
        if !self.connectivity.is_online() {
            return Err(StoreError::Network("offline".into()));
        }
        let session = self
            .auth
            .session()
            .await?
            .ok_or_else(|| StoreError::Auth("no active session".into()))?;
        if session.user.id != cached {
            return Err(StoreError::Auth("session user changed".into()));
        }
        Ok(OpContext {
            user_id: cached,
            token: session.access_token,
        })
    }

    fn scope(ctx: &OpContext) -> (String, String) {
        eq("user_id", &ctx.user_id)
    }

    async fn select_retried<T: serde::de::DeserializeOwned>(
        &self,
        op_name: &'static str,
        ctx: &OpContext,
        table: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>> {
        with_retry(&self.cancel, op_name, || {
            self.client.select(&ctx.token, table, query)
        })
        .await
    }

    async fn delete_retried(
        &self,
        op_name: &'static str,
        ctx: &OpContext,
        table: &str,
        query: &[(String, String)],
    ) -> Result<usize> {
        with_retry(&self.cancel, op_name, || {
            self.client.delete(&ctx.token, table, query)
        })
        .await
    }

    async fn fetch_game_row(&self, ctx: &OpContext, id: &str) -> Result<Option<GameRow>> {
        let query = vec![eq("id", id), Self::scope(ctx)];
        let rows: Vec<GameRow> = self
            .select_retried("getGame", ctx, GAMES_TABLE, &query)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_game(&self, ctx: &OpContext, state: AppState) -> Result<AppState> {
        let row = GameRow::from_domain(&state, &ctx.user_id)?;
        let inserted: GameRow = with_retry(&self.cancel, "insertGame", || {
            self.client.insert(&ctx.token, GAMES_TABLE, &row)
        })
        .await?;
        let state = inserted.into_domain()?;
        self.game_versions
            .lock()
            .await
            .insert(state.id.clone(), state.version);
        Ok(state)
    }

    async fn fetch_teams(&self, ctx: &OpContext, include_archived: bool) -> Result<Vec<Team>> {
        let mut query = vec![Self::scope(ctx), order_newest_first()];
        if !include_archived {
            query.push(eq("is_archived", "false"));
        }
        let rows: Vec<TeamRow> = self.client.select(&ctx.token, TEAMS_TABLE, &query).await?;
        Ok(rows.into_iter().map(TeamRow::into_domain).collect())
    }

    async fn fetch_seasons(&self, ctx: &OpContext, include_archived: bool) -> Result<Vec<Season>> {
        let mut query = vec![Self::scope(ctx), order_newest_first()];
        if !include_archived {
            query.push(eq("is_archived", "false"));
        }
        let rows: Vec<SeasonRow> = self.client.select(&ctx.token, SEASONS_TABLE, &query).await?;
        Ok(rows.into_iter().map(SeasonRow::into_domain).collect())
    }

    async fn fetch_tournaments(
        &self,
        ctx: &OpContext,
        include_archived: bool,
    ) -> Result<Vec<Tournament>> {
        let mut query = vec![Self::scope(ctx), order_newest_first()];
        if !include_archived {
            query.push(eq("is_archived", "false"));
        }
        let rows: Vec<TournamentRow> = self
            .client
            .select(&ctx.token, TOURNAMENTS_TABLE, &query)
            .await?;
        Ok(rows.into_iter().map(TournamentRow::into_domain).collect())
    }

    async fn fetch_personnel(&self, ctx: &OpContext) -> Result<Vec<PersonnelMember>> {
        let query = vec![Self::scope(ctx), order_newest_first()];
        let rows: Vec<PersonnelRow> = self
            .client
            .select(&ctx.token, PERSONNEL_TABLE, &query)
            .await?;
        rows.into_iter().map(PersonnelRow::into_domain).collect()
    }

    async fn season_window_start(&self) -> Option<String> {
        match self.get_settings().await {
            Ok(settings) => settings.club_season_start,
            Err(_) => None,
        }
    }
}

#[async_trait]
impl DataStore for RemoteDataStore {
    // ── Lifecycle ────────────────────────────────────────────────────────

    async fn initialize(&self) -> Result<()> {
        if self.user_id.read().await.is_some() {
            return Ok(());
        }
        self.auth.initialize().await?;
        let user = self
            .auth
            .current_user()
            .await?
            .ok_or_else(|| StoreError::Auth("no authenticated user".into()))?;
        *self.user_id.write().await = Some(user.id);
        Ok(())
    }

    async fn close(&self) {
        self.cancel.cancel();
        *self.user_id.write().await = None;
        *self.settings_cache.lock().await = None;
        self.game_versions.lock().await.clear();
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Supabase
    }

    async fn is_available(&self) -> bool {
        self.connectivity.is_online()
    }

    // ── Players ──────────────────────────────────────────────────────────

    async fn get_players(&self) -> Result<Vec<Player>> {
        let ctx = self.op_context().await?;
        let query = vec![Self::scope(&ctx), order_newest_first()];
        let rows: Vec<PlayerRow> = self.client.select(&ctx.token, PLAYERS_TABLE, &query).await?;
        Ok(rows.into_iter().map(PlayerRow::into_domain).collect())
    }

    async fn create_player(&self, new: NewPlayer) -> Result<Player> {
        let ctx = self.op_context().await?;
        let name = normalized_name(&new.name)?;
        let now = now_iso();
        let player = Player {
            id: new_entity_id("player"),
            name,
            nickname: new.nickname,
            jersey_number: new.jersey_number,
            is_goalie: new.is_goalie,
            received_fair_play_card: new.received_fair_play_card,
            color: new.color,
            notes: new.notes,
            created_at: now.clone(),
            updated_at: now,
        };
        let row = PlayerRow::from_domain(&player, &ctx.user_id);
        let inserted: PlayerRow = with_retry(&self.cancel, "createPlayer", || {
            self.client.insert(&ctx.token, PLAYERS_TABLE, &row)
        })
        .await?;
        Ok(inserted.into_domain())
    }

    async fn update_player(&self, id: &str, patch: PlayerPatch) -> Result<Option<Player>> {
        let ctx = self.op_context().await?;
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let rows: Vec<PlayerRow> = self
            .select_retried("updatePlayer", &ctx, PLAYERS_TABLE, &query)
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut player = row.into_domain();
        if let Some(name) = name {
            player.name = name;
        }
        if let Some(v) = patch.nickname {
            player.nickname = Some(v);
        }
        if let Some(v) = patch.jersey_number {
            player.jersey_number = Some(v);
        }
        if let Some(v) = patch.is_goalie {
            player.is_goalie = v;
        }
        if let Some(v) = patch.received_fair_play_card {
            player.received_fair_play_card = v;
        }
        if let Some(v) = patch.color {
            player.color = Some(v);
        }
        if let Some(v) = patch.notes {
            player.notes = Some(v);
        }
        player.updated_at = now_iso();

        let updated_row = PlayerRow::from_domain(&player, &ctx.user_id);
        let returned: Vec<PlayerRow> = with_retry(&self.cancel, "updatePlayer", || {
            self.client
                .update(&ctx.token, PLAYERS_TABLE, &query, &updated_row)
        })
        .await?;
        Ok(returned.into_iter().next().map(PlayerRow::into_domain))
    }

    async fn delete_player(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deletePlayer", &ctx, PLAYERS_TABLE, &query)
            .await?;
        Ok(deleted > 0)
    }

    async fn upsert_player(&self, mut player: Player) -> Result<Player> {
        let ctx = self.op_context().await?;
        player.name = normalized_name(&player.name)?;
        let row = PlayerRow::from_domain(&player, &ctx.user_id);
        let returned: PlayerRow = with_retry(&self.cancel, "upsertPlayer", || {
            self.client.upsert(&ctx.token, PLAYERS_TABLE, &row)
        })
        .await?;
        Ok(returned.into_domain())
    }

    // ── Teams ────────────────────────────────────────────────────────────

    async fn get_teams(&self, include_archived: bool) -> Result<Vec<Team>> {
        let ctx = self.op_context().await?;
        self.fetch_teams(&ctx, include_archived).await
    }

    async fn get_team_by_id(&self, id: &str) -> Result<Option<Team>> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let rows: Vec<TeamRow> = self
            .select_retried("getTeamById", &ctx, TEAMS_TABLE, &query)
            .await?;
        Ok(rows.into_iter().next().map(TeamRow::into_domain))
    }

    async fn create_team(&self, new: NewTeam) -> Result<Team> {
        let ctx = self.op_context().await?;
        let name = normalized_name(&new.name)?;
        let now = now_iso();
        let team = Team {
            id: new_entity_id("team"),
            name,
            color: new.color,
            notes: new.notes,
            age_group: new.age_group,
            game_type: new.game_type,
            is_archived: false,
            bound_season_id: new.bound_season_id,
            bound_tournament_id: new.bound_tournament_id,
            bound_tournament_series_id: new.bound_tournament_series_id,
            created_at: now.clone(),
            updated_at: now,
        };
        ensure_team_bindings(&team)?;
        // Advisory pre-read; the server's composite unique index is the
        // final authority and surfaces the same error class on race.
        let existing = self.fetch_teams(&ctx, true).await?;
        ensure_unique_team(&existing, &team, None)?;

        let row = TeamRow::from_domain(&team, &ctx.user_id);
        let inserted: TeamRow = with_retry(&self.cancel, "createTeam", || {
            self.client.insert(&ctx.token, TEAMS_TABLE, &row)
        })
        .await?;
        Ok(inserted.into_domain())
    }

    async fn update_team(&self, id: &str, patch: TeamPatch) -> Result<Option<Team>> {
        let ctx = self.op_context().await?;
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        let existing = self.fetch_teams(&ctx, true).await?;
        let Some(current) = existing.iter().find(|t| t.id == id).cloned() else {
            return Ok(None);
        };

        let mut updated = current;
        if let Some(name) = name {
            updated.name = name;
        }
        if let Some(v) = patch.color {
            updated.color = Some(v);
        }
        if let Some(v) = patch.notes {
            updated.notes = Some(v);
        }
        if let Some(v) = patch.age_group {
            updated.age_group = Some(v);
        }
        if let Some(v) = patch.game_type {
            updated.game_type = Some(v);
        }
        if let Some(v) = patch.is_archived {
            updated.is_archived = v;
        }
        if let Some(v) = patch.bound_season_id {
            updated.bound_season_id = Some(v);
        }
        if let Some(v) = patch.bound_tournament_id {
            updated.bound_tournament_id = Some(v);
        }
        if let Some(v) = patch.bound_tournament_series_id {
            updated.bound_tournament_series_id = Some(v);
        }
        ensure_team_bindings(&updated)?;
        ensure_unique_team(&existing, &updated, Some(id))?;
        updated.updated_at = now_iso();

        let query = vec![eq("id", id), Self::scope(&ctx)];
        let row = TeamRow::from_domain(&updated, &ctx.user_id);
        let returned: Vec<TeamRow> = with_retry(&self.cancel, "updateTeam", || {
            self.client.update(&ctx.token, TEAMS_TABLE, &query, &row)
        })
        .await?;
        Ok(returned.into_iter().next().map(TeamRow::into_domain))
    }

    async fn delete_team(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deleteTeam", &ctx, TEAMS_TABLE, &query)
            .await?;
        if deleted > 0 {
            let roster_query = vec![eq("team_id", id), Self::scope(&ctx)];
            if let Err(err) = self
                .client
                .delete(&ctx.token, TEAM_ROSTERS_TABLE, &roster_query)
                .await
            {
                warn!("roster cleanup after team delete failed: {err}");
            }
        }
        Ok(deleted > 0)
    }

    async fn upsert_team(&self, mut team: Team) -> Result<Team> {
        let ctx = self.op_context().await?;
        team.name = normalized_name(&team.name)?;
        ensure_team_bindings(&team)?;
        let existing = self.fetch_teams(&ctx, true).await?;
        ensure_unique_team(&existing, &team, Some(&team.id))?;

        let row = TeamRow::from_domain(&team, &ctx.user_id);
        let returned: TeamRow = with_retry(&self.cancel, "upsertTeam", || {
            self.client.upsert(&ctx.token, TEAMS_TABLE, &row)
        })
        .await?;
        Ok(returned.into_domain())
    }

    // ── Team rosters ─────────────────────────────────────────────────────

    async fn get_team_roster(&self, team_id: &str) -> Result<Vec<TeamRosterEntry>> {
        let ctx = self.op_context().await?;
        let query = vec![
            eq("team_id", team_id),
            Self::scope(&ctx),
            ("order".to_string(), "position.asc".to_string()),
        ];
        let rows: Vec<TeamRosterRow> = self
            .select_retried("getTeamRoster", &ctx, TEAM_ROSTERS_TABLE, &query)
            .await?;
        Ok(rows.into_iter().map(TeamRosterRow::into_domain).collect())
    }

    async fn set_team_roster(&self, team_id: &str, roster: Vec<TeamRosterEntry>) -> Result<()> {
        let ctx = self.op_context().await?;
        let delete_query = vec![eq("team_id", team_id), Self::scope(&ctx)];
        self.delete_retried("setTeamRoster", &ctx, TEAM_ROSTERS_TABLE, &delete_query)
            .await?;
        if roster.is_empty() {
            return Ok(());
        }
        let rows: Vec<TeamRosterRow> = roster
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                TeamRosterRow::from_domain(team_id, &ctx.user_id, position as i32, entry)
            })
            .collect();
        let _inserted: Vec<TeamRosterRow> = with_retry(&self.cancel, "setTeamRoster", || {
            self.client.insert_many(&ctx.token, TEAM_ROSTERS_TABLE, &rows)
        })
        .await?;
        Ok(())
    }

    async fn get_all_team_rosters(&self) -> Result<HashMap<String, Vec<TeamRosterEntry>>> {
        let ctx = self.op_context().await?;
        let query = vec![
            Self::scope(&ctx),
            ("order".to_string(), "team_id.asc,position.asc".to_string()),
        ];
        let rows: Vec<TeamRosterRow> = self
            .client
            .select(&ctx.token, TEAM_ROSTERS_TABLE, &query)
            .await?;
        let mut rosters: HashMap<String, Vec<TeamRosterEntry>> = HashMap::new();
        for row in rows {
            rosters
                .entry(row.team_id.clone())
                .or_default()
                .push(row.into_domain());
        }
        Ok(rosters)
    }

    // ── Seasons ──────────────────────────────────────────────────────────

    async fn get_seasons(&self, include_archived: bool) -> Result<Vec<Season>> {
        let ctx = self.op_context().await?;
        self.fetch_seasons(&ctx, include_archived).await
    }

    async fn create_season(&self, new: NewSeason) -> Result<Season> {
        let ctx = self.op_context().await?;
        let name = normalized_name(&new.name)?;
        let window = self.season_window_start().await;
        let now = now_iso();
        let season = Season {
            id: new_entity_id("season"),
            name,
            club_season: new
                .start_date
                .as_deref()
                .and_then(|d| club_season_label(d, window.as_deref())),
            start_date: new.start_date,
            end_date: new.end_date,
            game_type: new.game_type,
            gender: new.gender,
            age_group: new.age_group,
            league_id: new.league_id,
            custom_league_name: new.custom_league_name,
            is_archived: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let existing = self.fetch_seasons(&ctx, true).await?;
        ensure_unique_season(&existing, &season, None)?;

        let row = SeasonRow::from_domain(&season, &ctx.user_id);
        let inserted: SeasonRow = with_retry(&self.cancel, "createSeason", || {
            self.client.insert(&ctx.token, SEASONS_TABLE, &row)
        })
        .await?;
        Ok(inserted.into_domain())
    }

    async fn update_season(&self, mut season: Season) -> Result<Option<Season>> {
        let ctx = self.op_context().await?;
        season.name = normalized_name(&season.name)?;
        let window = self.season_window_start().await;
        season.club_season = season
            .start_date
            .as_deref()
            .and_then(|d| club_season_label(d, window.as_deref()));

        let existing = self.fetch_seasons(&ctx, true).await?;
        let Some(current) = existing.iter().find(|s| s.id == season.id) else {
            return Ok(None);
        };
        ensure_unique_season(&existing, &season, Some(&season.id))?;
        season.created_at = current.created_at.clone();
        season.updated_at = now_iso();

        let query = vec![eq("id", &season.id), Self::scope(&ctx)];
        let row = SeasonRow::from_domain(&season, &ctx.user_id);
        let returned: Vec<SeasonRow> = with_retry(&self.cancel, "updateSeason", || {
            self.client.update(&ctx.token, SEASONS_TABLE, &query, &row)
        })
        .await?;
        Ok(returned.into_iter().next().map(SeasonRow::into_domain))
    }

    async fn delete_season(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deleteSeason", &ctx, SEASONS_TABLE, &query)
            .await?;
        Ok(deleted > 0)
    }

    async fn upsert_season(&self, mut season: Season) -> Result<Season> {
        let ctx = self.op_context().await?;
        season.name = normalized_name(&season.name)?;
        let existing = self.fetch_seasons(&ctx, true).await?;
        ensure_unique_season(&existing, &season, Some(&season.id))?;

        let row = SeasonRow::from_domain(&season, &ctx.user_id);
        let returned: SeasonRow = with_retry(&self.cancel, "upsertSeason", || {
            self.client.upsert(&ctx.token, SEASONS_TABLE, &row)
        })
        .await?;
        Ok(returned.into_domain())
    }

    // ── Tournaments ──────────────────────────────────────────────────────

    async fn get_tournaments(&self, include_archived: bool) -> Result<Vec<Tournament>> {
        let ctx = self.op_context().await?;
        self.fetch_tournaments(&ctx, include_archived).await
    }

    async fn create_tournament(&self, new: NewTournament) -> Result<Tournament> {
        let ctx = self.op_context().await?;
        let name = normalized_name(&new.name)?;
        let window = self.season_window_start().await;
        let now = now_iso();
        let tournament = Tournament {
            id: new_entity_id("tournament"),
            name,
            club_season: new
                .start_date
                .as_deref()
                .and_then(|d| club_season_label(d, window.as_deref())),
            start_date: new.start_date,
            end_date: new.end_date,
            location: new.location,
            level: new.level,
            series_id: new.series_id,
            game_type: new.game_type,
            gender: new.gender,
            age_group: new.age_group,
            is_archived: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let existing = self.fetch_tournaments(&ctx, true).await?;
        ensure_unique_tournament(&existing, &tournament, None)?;

        let row = TournamentRow::from_domain(&tournament, &ctx.user_id);
        let inserted: TournamentRow = with_retry(&self.cancel, "createTournament", || {
            self.client.insert(&ctx.token, TOURNAMENTS_TABLE, &row)
        })
        .await?;
        Ok(inserted.into_domain())
    }

    async fn update_tournament(&self, mut tournament: Tournament) -> Result<Option<Tournament>> {
        let ctx = self.op_context().await?;
        tournament.name = normalized_name(&tournament.name)?;
        let window = self.season_window_start().await;
        tournament.club_season = tournament
            .start_date
            .as_deref()
            .and_then(|d| club_season_label(d, window.as_deref()));

        let existing = self.fetch_tournaments(&ctx, true).await?;
        let Some(current) = existing.iter().find(|t| t.id == tournament.id) else {
            return Ok(None);
        };
        ensure_unique_tournament(&existing, &tournament, Some(&tournament.id))?;
        tournament.created_at = current.created_at.clone();
        tournament.updated_at = now_iso();

        let query = vec![eq("id", &tournament.id), Self::scope(&ctx)];
        let row = TournamentRow::from_domain(&tournament, &ctx.user_id);
        let returned: Vec<TournamentRow> = with_retry(&self.cancel, "updateTournament", || {
            self.client
                .update(&ctx.token, TOURNAMENTS_TABLE, &query, &row)
        })
        .await?;
        Ok(returned.into_iter().next().map(TournamentRow::into_domain))
    }

    async fn delete_tournament(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deleteTournament", &ctx, TOURNAMENTS_TABLE, &query)
            .await?;
        Ok(deleted > 0)
    }

    async fn upsert_tournament(&self, mut tournament: Tournament) -> Result<Tournament> {
        let ctx = self.op_context().await?;
        tournament.name = normalized_name(&tournament.name)?;
        let existing = self.fetch_tournaments(&ctx, true).await?;
        ensure_unique_tournament(&existing, &tournament, Some(&tournament.id))?;

        let row = TournamentRow::from_domain(&tournament, &ctx.user_id);
        let returned: TournamentRow = with_retry(&self.cancel, "upsertTournament", || {
            self.client.upsert(&ctx.token, TOURNAMENTS_TABLE, &row)
        })
        .await?;
        Ok(returned.into_domain())
    }

    // ── Personnel ────────────────────────────────────────────────────────

    async fn get_all_personnel(&self) -> Result<Vec<PersonnelMember>> {
        let ctx = self.op_context().await?;
        self.fetch_personnel(&ctx).await
    }

    async fn get_personnel_by_id(&self, id: &str) -> Result<Option<PersonnelMember>> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let rows: Vec<PersonnelRow> = self
            .select_retried("getPersonnelById", &ctx, PERSONNEL_TABLE, &query)
            .await?;
        rows.into_iter()
            .next()
            .map(PersonnelRow::into_domain)
            .transpose()
    }

    async fn add_personnel_member(&self, new: NewPersonnelMember) -> Result<PersonnelMember> {
        let ctx = self.op_context().await?;
        let name = normalized_name(&new.name)?;
        let now = now_iso();
        let member = PersonnelMember {
            id: new_entity_id("personnel"),
            name,
            role: new.role,
            email: new.email,
            phone: new.phone,
            certifications: new.certifications,
            notes: new.notes,
            created_at: now.clone(),
            updated_at: now,
        };
        let existing = self.fetch_personnel(&ctx).await?;
        ensure_unique_personnel(&existing, &member.name, None)?;

        let row = PersonnelRow::from_domain(&member, &ctx.user_id)?;
        let inserted: PersonnelRow = with_retry(&self.cancel, "addPersonnelMember", || {
            self.client.insert(&ctx.token, PERSONNEL_TABLE, &row)
        })
        .await?;
        inserted.into_domain()
    }

    async fn update_personnel_member(
        &self,
        id: &str,
        patch: PersonnelPatch,
    ) -> Result<Option<PersonnelMember>> {
        let ctx = self.op_context().await?;
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        let existing = self.fetch_personnel(&ctx).await?;
        let Some(current) = existing.iter().find(|p| p.id == id).cloned() else {
            return Ok(None);
        };

        let mut updated = current;
        if let Some(name) = name {
            updated.name = name;
        }
        if let Some(v) = patch.role {
            updated.role = v;
        }
        if let Some(v) = patch.email {
            updated.email = Some(v);
        }
        if let Some(v) = patch.phone {
            updated.phone = Some(v);
        }
        if let Some(v) = patch.certifications {
            updated.certifications = v;
        }
        if let Some(v) = patch.notes {
            updated.notes = Some(v);
        }
        ensure_unique_personnel(&existing, &updated.name, Some(id))?;
        updated.updated_at = now_iso();

        let query = vec![eq("id", id), Self::scope(&ctx)];
        let row = PersonnelRow::from_domain(&updated, &ctx.user_id)?;
        let returned: Vec<PersonnelRow> = with_retry(&self.cancel, "updatePersonnelMember", || {
            self.client.update(&ctx.token, PERSONNEL_TABLE, &query, &row)
        })
        .await?;
        returned
            .into_iter()
            .next()
            .map(PersonnelRow::into_domain)
            .transpose()
    }

    /// Cascade handled server-side: one procedure deletes the member and
    /// strips its references from every game row in a single transaction.
    async fn remove_personnel_member(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let args = serde_json::json!({ "p_personnel_id": id });
        let value = with_retry(&self.cancel, "removePersonnelMember", || {
            self.client.rpc(&ctx.token, PERSONNEL_CASCADE_RPC, &args)
        })
        .await?;
        // The cascade rewrites game documents; cached versions are stale.
        self.game_versions.lock().await.clear();
        Ok(value.as_u64().unwrap_or(0) > 0 || value.as_bool().unwrap_or(false))
    }

    async fn upsert_personnel_member(&self, mut member: PersonnelMember) -> Result<PersonnelMember> {
        let ctx = self.op_context().await?;
        member.name = normalized_name(&member.name)?;
        let existing = self.fetch_personnel(&ctx).await?;
        ensure_unique_personnel(&existing, &member.name, Some(&member.id))?;

        let row = PersonnelRow::from_domain(&member, &ctx.user_id)?;
        let returned: PersonnelRow = with_retry(&self.cancel, "upsertPersonnelMember", || {
            self.client.upsert(&ctx.token, PERSONNEL_TABLE, &row)
        })
        .await?;
        returned.into_domain()
    }

    // ── Games ────────────────────────────────────────────────────────────

    async fn get_games(&self) -> Result<HashMap<String, AppState>> {
        let ctx = self.op_context().await?;
        let query = vec![Self::scope(&ctx), order_newest_first()];
        let rows: Vec<GameRow> = self.client.select(&ctx.token, GAMES_TABLE, &query).await?;
        let mut games = HashMap::new();
        let mut versions = self.game_versions.lock().await;
        for row in rows {
            versions.insert(row.id.clone(), row.version);
            let state = row.into_domain()?;
            games.insert(state.id.clone(), state);
        }
        Ok(games)
    }

    async fn get_game_by_id(&self, id: &str) -> Result<Option<AppState>> {
        let ctx = self.op_context().await?;
        match self.fetch_game_row(&ctx, id).await? {
            Some(row) => {
                self.game_versions
                    .lock()
                    .await
                    .insert(row.id.clone(), row.version);
                Ok(Some(row.into_domain()?))
            }
            None => Ok(None),
        }
    }

    async fn create_game(&self, new: NewGame) -> Result<AppState> {
        let ctx = self.op_context().await?;
        let team_name = match new.team_name {
            Some(name) => name,
            None => self
                .get_settings()
                .await
                .map(|s| s.last_home_team_name)
                .unwrap_or_default(),
        };
        let now = now_iso();
        let state = AppState {
            id: new_entity_id("game"),
            team_name,
            opponent_name: new.opponent_name,
            game_date: new.game_date,
            home_score: 0,
            away_score: 0,
            current_period: 1,
            game_status: Default::default(),
            game_events: Vec::new(),
            available_players: new.available_players,
            players_on_field: Vec::new(),
            selected_player_ids: new.selected_player_ids,
            period_duration_minutes: new
                .period_duration_minutes
                .unwrap_or(DEFAULT_PERIOD_DURATION_MINUTES),
            number_of_periods: new.number_of_periods.unwrap_or(DEFAULT_NUMBER_OF_PERIODS),
            season_id: new.season_id.unwrap_or_default(),
            tournament_id: new.tournament_id.unwrap_or_default(),
            tournament_level: None,
            final_placement: None,
            game_personnel: new.game_personnel,
            game_notes: None,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        };
        self.insert_game(&ctx, state).await
    }

    /// Optimistic write: the update is conditioned on `version = cached` and
    /// carries `cached + 1`. A serialization-failure response or an empty
    /// conditional update resolves to `CONFLICT` with a backup of the
    /// current server state; the cache is left untouched.
    async fn save_game(&self, id: &str, mut state: AppState) -> Result<AppState> {
        let ctx = self.op_context().await?;
        state.id = id.to_string();

        let cached = { self.game_versions.lock().await.get(id).copied() };
        let cached = match cached {
            Some(version) => version,
            None => match self.fetch_game_row(&ctx, id).await? {
                Some(row) => {
                    self.game_versions
                        .lock()
                        .await
                        .insert(id.to_string(), row.version);
                    row.version
                }
                None => {
                    // First sync of a locally created game.
                    state.version = state.version.max(1);
                    return self.insert_game(&ctx, state).await;
                }
            },
        };

        state.version = cached + 1;
        state.updated_at = now_iso();
        let row = GameRow::from_domain(&state, &ctx.user_id)?;
        let patch = serde_json::json!({
            "season_id": row.season_id,
            "tournament_id": row.tournament_id,
            "version": row.version,
            "state": row.state,
            "updated_at": row.updated_at,
        });
        let query = vec![
            eq("id", id),
            Self::scope(&ctx),
            eq("version", &cached.to_string()),
        ];
        let result: Result<Vec<GameRow>> = with_retry(&self.cancel, "saveGame", || {
            self.client.update(&ctx.token, GAMES_TABLE, &query, &patch)
        })
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(StoreError::Conflict { .. }) => Vec::new(),
            Err(err) => return Err(err),
        };

        match rows.into_iter().next() {
            Some(row) => {
                self.game_versions
                    .lock()
                    .await
                    .insert(id.to_string(), row.version);
                row.into_domain()
            }
            None => {
                let backup = match self.fetch_game_row(&ctx, id).await? {
                    Some(row) => Some(serde_json::to_value(row.into_domain()?)?),
                    None => None,
                };
                Err(StoreError::conflict(id, backup))
            }
        }
    }

    /// Bulk copy path: rows are written verbatim (no version bump) so the
    /// operation is idempotent.
    async fn save_all_games(&self, games: HashMap<String, AppState>) -> Result<()> {
        let ctx = self.op_context().await?;
        let mut rows = Vec::with_capacity(games.len());
        for (id, mut state) in games {
            state.id = id;
            state.version = state.version.max(1);
            rows.push(GameRow::from_domain(&state, &ctx.user_id)?);
        }
        for row in &rows {
            let _returned: GameRow = with_retry(&self.cancel, "saveAllGames", || {
                self.client.upsert(&ctx.token, GAMES_TABLE, row)
            })
            .await?;
        }
        let mut versions = self.game_versions.lock().await;
        for row in rows {
            versions.insert(row.id.clone(), row.version);
        }
        Ok(())
    }

    async fn delete_game(&self, id: &str) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", id), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deleteGame", &ctx, GAMES_TABLE, &query)
            .await?;
        self.game_versions.lock().await.remove(id);
        Ok(deleted > 0)
    }

    // ── Game events ──────────────────────────────────────────────────────
    //
    // The local contract is index-based; remotely the whole state document
    // is rewritten through the optimistic save, so the translation stays
    // internal to this store.

    async fn add_game_event(&self, game_id: &str, event: GameEvent) -> Result<Option<AppState>> {
        let Some(mut game) = self.get_game_by_id(game_id).await? else {
            return Ok(None);
        };
        game.game_events.push(event);
        Ok(Some(self.save_game(game_id, game).await?))
    }

    async fn update_game_event(
        &self,
        game_id: &str,
        index: usize,
        event: GameEvent,
    ) -> Result<Option<AppState>> {
        let Some(mut game) = self.get_game_by_id(game_id).await? else {
            return Ok(None);
        };
        if index >= game.game_events.len() {
            return Ok(None);
        }
        game.game_events[index] = event;
        Ok(Some(self.save_game(game_id, game).await?))
    }

    async fn remove_game_event(&self, game_id: &str, index: usize) -> Result<Option<AppState>> {
        let Some(mut game) = self.get_game_by_id(game_id).await? else {
            return Ok(None);
        };
        if index >= game.game_events.len() {
            return Ok(None);
        }
        game.game_events.remove(index);
        Ok(Some(self.save_game(game_id, game).await?))
    }

    // ── Player adjustments ───────────────────────────────────────────────

    async fn get_player_adjustments(&self, player_id: &str) -> Result<Vec<PlayerAdjustment>> {
        let ctx = self.op_context().await?;
        let query = vec![
            eq("player_id", player_id),
            Self::scope(&ctx),
            order_newest_first(),
        ];
        let rows: Vec<AdjustmentRow> = self
            .select_retried("getPlayerAdjustments", &ctx, ADJUSTMENTS_TABLE, &query)
            .await?;
        Ok(rows.into_iter().map(AdjustmentRow::into_domain).collect())
    }

    async fn add_player_adjustment(&self, new: NewPlayerAdjustment) -> Result<PlayerAdjustment> {
        let ctx = self.op_context().await?;
        let now = now_iso();
        let adjustment = PlayerAdjustment {
            id: new_entity_id("adjustment"),
            player_id: new.player_id,
            games_played_delta: new.games_played_delta,
            goals_delta: new.goals_delta,
            assists_delta: new.assists_delta,
            applied_at: now.clone(),
            note: new.note,
            created_at: now.clone(),
            updated_at: now,
        };
        let row = AdjustmentRow::from_domain(&adjustment, &ctx.user_id);
        let inserted: AdjustmentRow = with_retry(&self.cancel, "addPlayerAdjustment", || {
            self.client.insert(&ctx.token, ADJUSTMENTS_TABLE, &row)
        })
        .await?;
        Ok(inserted.into_domain())
    }

    async fn update_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
        patch: AdjustmentPatch,
    ) -> Result<Option<PlayerAdjustment>> {
        let ctx = self.op_context().await?;
        let query = vec![
            eq("id", adjustment_id),
            eq("player_id", player_id),
            Self::scope(&ctx),
        ];
        let rows: Vec<AdjustmentRow> = self
            .select_retried("updatePlayerAdjustment", &ctx, ADJUSTMENTS_TABLE, &query)
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut adjustment = row.into_domain();
        if let Some(v) = patch.games_played_delta {
            adjustment.games_played_delta = v;
        }
        if let Some(v) = patch.goals_delta {
            adjustment.goals_delta = v;
        }
        if let Some(v) = patch.assists_delta {
            adjustment.assists_delta = v;
        }
        if let Some(v) = patch.note {
            adjustment.note = Some(v);
        }
        adjustment.updated_at = now_iso();

        let updated_row = AdjustmentRow::from_domain(&adjustment, &ctx.user_id);
        let returned: Vec<AdjustmentRow> = with_retry(&self.cancel, "updatePlayerAdjustment", || {
            self.client
                .update(&ctx.token, ADJUSTMENTS_TABLE, &query, &updated_row)
        })
        .await?;
        Ok(returned.into_iter().next().map(AdjustmentRow::into_domain))
    }

    async fn delete_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
    ) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![
            eq("id", adjustment_id),
            eq("player_id", player_id),
            Self::scope(&ctx),
        ];
        let deleted = self
            .delete_retried("deletePlayerAdjustment", &ctx, ADJUSTMENTS_TABLE, &query)
            .await?;
        Ok(deleted > 0)
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: PlayerAdjustment,
    ) -> Result<PlayerAdjustment> {
        let ctx = self.op_context().await?;
        let row = AdjustmentRow::from_domain(&adjustment, &ctx.user_id);
        let returned: AdjustmentRow = with_retry(&self.cancel, "upsertPlayerAdjustment", || {
            self.client.upsert(&ctx.token, ADJUSTMENTS_TABLE, &row)
        })
        .await?;
        Ok(returned.into_domain())
    }

    // ── Warmup plan ──────────────────────────────────────────────────────

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", WARMUP_PLAN_ID), Self::scope(&ctx)];
        let rows: Vec<WarmupPlanRow> = self
            .select_retried("getWarmupPlan", &ctx, WARMUP_PLANS_TABLE, &query)
            .await?;
        rows.into_iter()
            .next()
            .map(WarmupPlanRow::into_domain)
            .transpose()
    }

    async fn save_warmup_plan(&self, mut plan: WarmupPlan) -> Result<WarmupPlan> {
        let ctx = self.op_context().await?;
        plan.id = WARMUP_PLAN_ID.to_string();
        plan.is_default = false;
        plan.updated_at = now_iso();
        let row = WarmupPlanRow::from_domain(&plan, &ctx.user_id)?;
        let returned: WarmupPlanRow = with_retry(&self.cancel, "saveWarmupPlan", || {
            self.client.upsert(&ctx.token, WARMUP_PLANS_TABLE, &row)
        })
        .await?;
        returned.into_domain()
    }

    async fn delete_warmup_plan(&self) -> Result<bool> {
        let ctx = self.op_context().await?;
        let query = vec![eq("id", WARMUP_PLAN_ID), Self::scope(&ctx)];
        let deleted = self
            .delete_retried("deleteWarmupPlan", &ctx, WARMUP_PLANS_TABLE, &query)
            .await?;
        Ok(deleted > 0)
    }

    // ── Settings ─────────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<AppSettings> {
        {
            let cache = self.settings_cache.lock().await;
            if let Some(settings) = cache.as_ref() {
                return Ok(settings.clone());
            }
        }
        let ctx = self.op_context().await?;
        let query = vec![Self::scope(&ctx)];
        let rows: Vec<SettingsRow> = self
            .client
            .select(&ctx.token, SETTINGS_TABLE, &query)
            .await?;
        let settings = rows
            .into_iter()
            .next()
            .map(SettingsRow::into_domain)
            .unwrap_or_default();
        *self.settings_cache.lock().await = Some(settings.clone());
        Ok(settings)
    }

    async fn save_settings(&self, settings: AppSettings) -> Result<AppSettings> {
        let ctx = self.op_context().await?;
        let row = SettingsRow::from_domain(&settings, &ctx.user_id);
        // Hold the cache lock across the write so the cache and the server
        // can't be observed out of step within this process.
        let mut cache = self.settings_cache.lock().await;
        let _returned: SettingsRow = with_retry(&self.cancel, "saveSettings", || {
            self.client.upsert(&ctx.token, SETTINGS_TABLE, &row)
        })
        .await?;
        *cache = Some(settings.clone());
        Ok(settings)
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<AppSettings> {
        let mut settings = self.get_settings().await?;
        settings.apply_patch(patch);
        self.save_settings(settings).await
    }

    // ── Timer state: local-only by contract ──────────────────────────────

    async fn get_timer_state(&self) -> Result<Option<TimerState>> {
        Ok(None)
    }

    async fn save_timer_state(&self, _state: TimerState) -> Result<()> {
        Ok(())
    }

    async fn clear_timer_state(&self) -> Result<()> {
        Ok(())
    }
}
