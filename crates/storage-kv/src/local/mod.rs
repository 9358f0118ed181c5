//! LocalDataStore: the full DataStore contract over the per-user KV
//! database.
//!
//! Storage layout is one KV key per logical collection; every write is a
//! whole-document read-modify-write under the collection's advisory lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use matchops_core::model::{
    club_season_label, new_entity_id, normalized_name, now_iso, AdjustmentPatch, AppSettings,
    AppState, GameEvent, NewGame, NewPersonnelMember, NewPlayer, NewPlayerAdjustment, NewSeason,
    NewTeam, NewTournament, PersonnelMember, PersonnelPatch, Player, PlayerAdjustment,
    PlayerPatch, Season, SettingsPatch, Team, TeamPatch, TeamRosterEntry, TimerState, Tournament,
    WarmupPlan, DEFAULT_NUMBER_OF_PERIODS, DEFAULT_PERIOD_DURATION_MINUTES, TIMER_STATE_KEY,
    WARMUP_PLAN_ID,
};
use matchops_core::{BackendKind, DataStore, Result, StoreError};

use crate::keys::{
    KEY_APP_SETTINGS, KEY_MASTER_ROSTER, KEY_PERSONNEL, KEY_PLAYER_ADJUSTMENTS, KEY_SAVED_GAMES,
    KEY_SEASONS, KEY_TEAMS, KEY_TEAM_ROSTERS, KEY_TOURNAMENTS, KEY_WARMUP_PLAN,
};
use crate::kv::{KeyLock, KvAdapter};


fn ensure_team_bindings(
    bound_tournament_id: Option<&str>,
    bound_tournament_series_id: Option<&str>,
) -> Result<()> {
    if bound_tournament_series_id.is_some() && bound_tournament_id.is_none() {
        return Err(StoreError::Validation(
            "a tournament series binding requires a tournament binding".into(),
        ));
    }
    Ok(())
}

fn ensure_unique_team(teams: &[Team], candidate: &Team, exclude_id: Option<&str>) -> Result<()> {
    let key = candidate.uniqueness_key();
    let clash = teams
        .iter()
        .filter(|t| exclude_id != Some(t.id.as_str()))
        .any(|t| t.uniqueness_key() == key);
    if clash {
        return Err(StoreError::already_exists("team", candidate.name.clone()));
    }
    Ok(())
}

fn ensure_unique_season(
    seasons: &[Season],
    candidate: &Season,
    exclude_id: Option<&str>,
) -> Result<()> {
    let key = candidate.uniqueness_key();
    let clash = seasons
        .iter()
        .filter(|s| exclude_id != Some(s.id.as_str()))
        .any(|s| s.uniqueness_key() == key);
    if clash {
        return Err(StoreError::already_exists("season", candidate.name.clone()));
    }
    Ok(())
}

fn ensure_unique_tournament(
    tournaments: &[Tournament],
    candidate: &Tournament,
    exclude_id: Option<&str>,
) -> Result<()> {
    let key = candidate.uniqueness_key();
    let clash = tournaments
        .iter()
        .filter(|t| exclude_id != Some(t.id.as_str()))
        .any(|t| t.uniqueness_key() == key);
    if clash {
        return Err(StoreError::already_exists(
            "tournament",
            candidate.name.clone(),
        ));
    }
    Ok(())
}

fn ensure_unique_personnel(
    personnel: &[PersonnelMember],
    name: &str,
    exclude_id: Option<&str>,
) -> Result<()> {
    let folded = matchops_core::model::folded_name(name);
    let clash = personnel
        .iter()
        .filter(|p| exclude_id != Some(p.id.as_str()))
        .any(|p| matchops_core::model::folded_name(&p.name) == folded);
    if clash {
        return Err(StoreError::already_exists("personnel", name.to_string()));
    }
    Ok(())
}

pub struct LocalDataStore {
    kv: Arc<dyn KvAdapter>,
    locks: KeyLock,
}

impl LocalDataStore {
    pub fn new(kv: Arc<dyn KvAdapter>) -> Self {
        Self {
            kv,
            locks: KeyLock::new(),
        }
    }

    pub fn kv(&self) -> Arc<dyn KvAdapter> {
        Arc::clone(&self.kv)
    }

    /// Read a whole collection document. A document that fails to parse
    /// degrades to the empty collection and logs; missing keys are empty.
    async fn read_doc<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.kv.get(key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(value),
                Err(err) => {
                    warn!("collection '{key}' unreadable, degrading to empty: {err}");
                    Ok(T::default())
                }
            },
            None => Ok(T::default()),
        }
    }

    async fn write_doc<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.kv.set(key, serde_json::to_vec(value)?).await
    }

    async fn season_window_start(&self) -> Option<String> {
        self.read_doc::<Option<AppSettings>>(KEY_APP_SETTINGS)
            .await
            .ok()
            .flatten()
            .and_then(|settings| settings.club_season_start)
    }

    /// Wipe the whole user database. Used on account deletion and by the
    /// synced wrapper's `clear_all_user_data`.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.kv.clear().await
    }
}

#[async_trait]
impl DataStore for LocalDataStore {
    // ── Lifecycle ────────────────────────────────────────────────────────

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        // Writes flush per operation; nothing to tear down.
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn is_available(&self) -> bool {
        self.kv.is_available()
    }

    // ── Players ──────────────────────────────────────────────────────────

    async fn get_players(&self) -> Result<Vec<Player>> {
        self.read_doc(KEY_MASTER_ROSTER).await
    }

    async fn create_player(&self, new: NewPlayer) -> Result<Player> {
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
        self.locks
            .with_key_lock(KEY_MASTER_ROSTER, async {
                let mut players: Vec<Player> = self.read_doc(KEY_MASTER_ROSTER).await?;
                players.push(player.clone());
                self.write_doc(KEY_MASTER_ROSTER, &players).await
            })
            .await?;
        Ok(player)
    }

    async fn update_player(&self, id: &str, patch: PlayerPatch) -> Result<Option<Player>> {
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        self.locks
            .with_key_lock(KEY_MASTER_ROSTER, async {
                let mut players: Vec<Player> = self.read_doc(KEY_MASTER_ROSTER).await?;
                let Some(player) = players.iter_mut().find(|p| p.id == id) else {
                    return Ok(None);
                };
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
                let updated = player.clone();
                self.write_doc(KEY_MASTER_ROSTER, &players).await?;
                Ok(Some(updated))
            })
            .await
    }

    async fn delete_player(&self, id: &str) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_MASTER_ROSTER, async {
                let mut players: Vec<Player> = self.read_doc(KEY_MASTER_ROSTER).await?;
                let before = players.len();
                players.retain(|p| p.id != id);
                if players.len() == before {
                    return Ok(false);
                }
                self.write_doc(KEY_MASTER_ROSTER, &players).await?;
                Ok(true)
            })
            .await
    }

    async fn upsert_player(&self, mut player: Player) -> Result<Player> {
        player.name = normalized_name(&player.name)?;
        self.locks
            .with_key_lock(KEY_MASTER_ROSTER, async {
                let mut players: Vec<Player> = self.read_doc(KEY_MASTER_ROSTER).await?;
                match players.iter_mut().find(|p| p.id == player.id) {
                    Some(existing) => *existing = player.clone(),
                    None => players.push(player.clone()),
                }
                self.write_doc(KEY_MASTER_ROSTER, &players).await
            })
            .await?;
        Ok(player)
    }

    // ── Teams ────────────────────────────────────────────────────────────

    async fn get_teams(&self, include_archived: bool) -> Result<Vec<Team>> {
        let teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
        Ok(teams
            .into_iter()
            .filter(|t| include_archived || !t.is_archived)
            .collect())
    }

    async fn get_team_by_id(&self, id: &str) -> Result<Option<Team>> {
        let teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
        Ok(teams.into_iter().find(|t| t.id == id))
    }

    async fn create_team(&self, new: NewTeam) -> Result<Team> {
        let name = normalized_name(&new.name)?;
        ensure_team_bindings(
            new.bound_tournament_id.as_deref(),
            new.bound_tournament_series_id.as_deref(),
        )?;
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
        self.locks
            .with_key_lock(KEY_TEAMS, async {
                let mut teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
                ensure_unique_team(&teams, &team, None)?;
                teams.push(team.clone());
                self.write_doc(KEY_TEAMS, &teams).await
            })
            .await?;
        Ok(team)
    }

    async fn update_team(&self, id: &str, patch: TeamPatch) -> Result<Option<Team>> {
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        self.locks
            .with_key_lock(KEY_TEAMS, async {
                let teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
                let Some(pos) = teams.iter().position(|t| t.id == id) else {
                    return Ok(None);
                };
                let mut updated = teams[pos].clone();
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
                ensure_team_bindings(
                    updated.bound_tournament_id.as_deref(),
                    updated.bound_tournament_series_id.as_deref(),
                )?;
                updated.updated_at = now_iso();
                ensure_unique_team(&teams, &updated, Some(id))?;

                let mut teams = teams;
                teams[pos] = updated.clone();
                self.write_doc(KEY_TEAMS, &teams).await?;
                Ok(Some(updated))
            })
            .await
    }

    async fn delete_team(&self, id: &str) -> Result<bool> {
        let removed = self
            .locks
            .with_key_lock(KEY_TEAMS, async {
                let mut teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
                let before = teams.len();
                teams.retain(|t| t.id != id);
                if teams.len() == before {
                    return Ok::<_, StoreError>(false);
                }
                self.write_doc(KEY_TEAMS, &teams).await?;
                Ok(true)
            })
            .await?;
        if removed {
            // Roster cleanup is best-effort; an orphaned roster is invisible
            // through the contract and reclaimed on the next set.
            let cleanup = self
                .locks
                .with_key_lock(KEY_TEAM_ROSTERS, async {
                    let mut rosters: HashMap<String, Vec<TeamRosterEntry>> =
                        self.read_doc(KEY_TEAM_ROSTERS).await?;
                    if rosters.remove(id).is_some() {
                        self.write_doc(KEY_TEAM_ROSTERS, &rosters).await?;
                    }
                    Ok::<_, StoreError>(())
                })
                .await;
            if let Err(err) = cleanup {
                warn!("roster cleanup after team delete failed: {err}");
            }
        }
        Ok(removed)
    }

    async fn upsert_team(&self, mut team: Team) -> Result<Team> {
        team.name = normalized_name(&team.name)?;
        ensure_team_bindings(
            team.bound_tournament_id.as_deref(),
            team.bound_tournament_series_id.as_deref(),
        )?;
        self.locks
            .with_key_lock(KEY_TEAMS, async {
                let mut teams: Vec<Team> = self.read_doc(KEY_TEAMS).await?;
                ensure_unique_team(&teams, &team, Some(&team.id))?;
                match teams.iter_mut().find(|t| t.id == team.id) {
                    Some(existing) => *existing = team.clone(),
                    None => teams.push(team.clone()),
                }
                self.write_doc(KEY_TEAMS, &teams).await
            })
            .await?;
        Ok(team)
    }

    // ── Team rosters ─────────────────────────────────────────────────────

    async fn get_team_roster(&self, team_id: &str) -> Result<Vec<TeamRosterEntry>> {
        let rosters: HashMap<String, Vec<TeamRosterEntry>> =
            self.read_doc(KEY_TEAM_ROSTERS).await?;
        Ok(rosters.get(team_id).cloned().unwrap_or_default())
    }

    async fn set_team_roster(&self, team_id: &str, roster: Vec<TeamRosterEntry>) -> Result<()> {
        self.locks
            .with_key_lock(KEY_TEAM_ROSTERS, async {
                let mut rosters: HashMap<String, Vec<TeamRosterEntry>> =
                    self.read_doc(KEY_TEAM_ROSTERS).await?;
                // Ordered set keyed by player id: last occurrence wins.
                let mut deduped: Vec<TeamRosterEntry> = Vec::with_capacity(roster.len());
                for entry in roster {
                    deduped.retain(|e| e.player_id != entry.player_id);
                    deduped.push(entry);
                }
                rosters.insert(team_id.to_string(), deduped);
                self.write_doc(KEY_TEAM_ROSTERS, &rosters).await
            })
            .await
    }

    async fn get_all_team_rosters(&self) -> Result<HashMap<String, Vec<TeamRosterEntry>>> {
        self.read_doc(KEY_TEAM_ROSTERS).await
    }

    // ── Seasons ──────────────────────────────────────────────────────────

    async fn get_seasons(&self, include_archived: bool) -> Result<Vec<Season>> {
        let seasons: Vec<Season> = self.read_doc(KEY_SEASONS).await?;
        Ok(seasons
            .into_iter()
            .filter(|s| include_archived || !s.is_archived)
            .collect())
    }

    async fn create_season(&self, new: NewSeason) -> Result<Season> {
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
        self.locks
            .with_key_lock(KEY_SEASONS, async {
                let mut seasons: Vec<Season> = self.read_doc(KEY_SEASONS).await?;
                ensure_unique_season(&seasons, &season, None)?;
                seasons.push(season.clone());
                self.write_doc(KEY_SEASONS, &seasons).await
            })
            .await?;
        Ok(season)
    }

    async fn update_season(&self, mut season: Season) -> Result<Option<Season>> {
        season.name = normalized_name(&season.name)?;
        let window = self.season_window_start().await;
        season.club_season = season
            .start_date
            .as_deref()
            .and_then(|d| club_season_label(d, window.as_deref()));
        self.locks
            .with_key_lock(KEY_SEASONS, async {
                let mut seasons: Vec<Season> = self.read_doc(KEY_SEASONS).await?;
                let Some(pos) = seasons.iter().position(|s| s.id == season.id) else {
                    return Ok(None);
                };
                ensure_unique_season(&seasons, &season, Some(&season.id))?;
                season.created_at = seasons[pos].created_at.clone();
                season.updated_at = now_iso();
                seasons[pos] = season.clone();
                self.write_doc(KEY_SEASONS, &seasons).await?;
                Ok(Some(season))
            })
            .await
    }

    async fn delete_season(&self, id: &str) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_SEASONS, async {
                let mut seasons: Vec<Season> = self.read_doc(KEY_SEASONS).await?;
                let before = seasons.len();
                seasons.retain(|s| s.id != id);
                if seasons.len() == before {
                    return Ok(false);
                }
                self.write_doc(KEY_SEASONS, &seasons).await?;
                Ok(true)
            })
            .await
    }

    async fn upsert_season(&self, mut season: Season) -> Result<Season> {
        season.name = normalized_name(&season.name)?;
        self.locks
            .with_key_lock(KEY_SEASONS, async {
                let mut seasons: Vec<Season> = self.read_doc(KEY_SEASONS).await?;
                ensure_unique_season(&seasons, &season, Some(&season.id))?;
                match seasons.iter_mut().find(|s| s.id == season.id) {
                    Some(existing) => *existing = season.clone(),
                    None => seasons.push(season.clone()),
                }
                self.write_doc(KEY_SEASONS, &seasons).await
            })
            .await?;
        Ok(season)
    }

    // ── Tournaments ──────────────────────────────────────────────────────

    async fn get_tournaments(&self, include_archived: bool) -> Result<Vec<Tournament>> {
        let tournaments: Vec<Tournament> = self.read_doc(KEY_TOURNAMENTS).await?;
        Ok(tournaments
            .into_iter()
            .filter(|t| include_archived || !t.is_archived)
            .collect())
    }

    async fn create_tournament(&self, new: NewTournament) -> Result<Tournament> {
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
        self.locks
            .with_key_lock(KEY_TOURNAMENTS, async {
                let mut tournaments: Vec<Tournament> = self.read_doc(KEY_TOURNAMENTS).await?;
                ensure_unique_tournament(&tournaments, &tournament, None)?;
                tournaments.push(tournament.clone());
                self.write_doc(KEY_TOURNAMENTS, &tournaments).await
            })
            .await?;
        Ok(tournament)
    }

    async fn update_tournament(&self, mut tournament: Tournament) -> Result<Option<Tournament>> {
        tournament.name = normalized_name(&tournament.name)?;
        let window = self.season_window_start().await;
        tournament.club_season = tournament
            .start_date
            .as_deref()
            .and_then(|d| club_season_label(d, window.as_deref()));
        self.locks
            .with_key_lock(KEY_TOURNAMENTS, async {
                let mut tournaments: Vec<Tournament> = self.read_doc(KEY_TOURNAMENTS).await?;
                let Some(pos) = tournaments.iter().position(|t| t.id == tournament.id) else {
                    return Ok(None);
                };
                ensure_unique_tournament(&tournaments, &tournament, Some(&tournament.id))?;
                tournament.created_at = tournaments[pos].created_at.clone();
                tournament.updated_at = now_iso();
                tournaments[pos] = tournament.clone();
                self.write_doc(KEY_TOURNAMENTS, &tournaments).await?;
                Ok(Some(tournament))
            })
            .await
    }

    async fn delete_tournament(&self, id: &str) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_TOURNAMENTS, async {
                let mut tournaments: Vec<Tournament> = self.read_doc(KEY_TOURNAMENTS).await?;
                let before = tournaments.len();
                tournaments.retain(|t| t.id != id);
                if tournaments.len() == before {
                    return Ok(false);
                }
                self.write_doc(KEY_TOURNAMENTS, &tournaments).await?;
                Ok(true)
            })
            .await
    }

    async fn upsert_tournament(&self, mut tournament: Tournament) -> Result<Tournament> {
        tournament.name = normalized_name(&tournament.name)?;
        self.locks
            .with_key_lock(KEY_TOURNAMENTS, async {
                let mut tournaments: Vec<Tournament> = self.read_doc(KEY_TOURNAMENTS).await?;
                ensure_unique_tournament(&tournaments, &tournament, Some(&tournament.id))?;
                match tournaments.iter_mut().find(|t| t.id == tournament.id) {
                    Some(existing) => *existing = tournament.clone(),
                    None => tournaments.push(tournament.clone()),
                }
                self.write_doc(KEY_TOURNAMENTS, &tournaments).await
            })
            .await?;
        Ok(tournament)
    }

    // ── Personnel ────────────────────────────────────────────────────────

    async fn get_all_personnel(&self) -> Result<Vec<PersonnelMember>> {
        self.read_doc(KEY_PERSONNEL).await
    }

    async fn get_personnel_by_id(&self, id: &str) -> Result<Option<PersonnelMember>> {
        let personnel: Vec<PersonnelMember> = self.read_doc(KEY_PERSONNEL).await?;
        Ok(personnel.into_iter().find(|p| p.id == id))
    }

    async fn add_personnel_member(&self, new: NewPersonnelMember) -> Result<PersonnelMember> {
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
        self.locks
            .with_key_lock(KEY_PERSONNEL, async {
                let mut personnel: Vec<PersonnelMember> = self.read_doc(KEY_PERSONNEL).await?;
                ensure_unique_personnel(&personnel, &member.name, None)?;
                personnel.push(member.clone());
                self.write_doc(KEY_PERSONNEL, &personnel).await
            })
            .await?;
        Ok(member)
    }

    async fn update_personnel_member(
        &self,
        id: &str,
        patch: PersonnelPatch,
    ) -> Result<Option<PersonnelMember>> {
        let name = patch.name.as_deref().map(normalized_name).transpose()?;
        self.locks
            .with_key_lock(KEY_PERSONNEL, async {
                let personnel: Vec<PersonnelMember> = self.read_doc(KEY_PERSONNEL).await?;
                let Some(pos) = personnel.iter().position(|p| p.id == id) else {
                    return Ok(None);
                };
                let mut updated = personnel[pos].clone();
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
                updated.updated_at = now_iso();
                ensure_unique_personnel(&personnel, &updated.name, Some(id))?;

                let mut personnel = personnel;
                personnel[pos] = updated.clone();
                self.write_doc(KEY_PERSONNEL, &personnel).await?;
                Ok(Some(updated))
            })
            .await
    }

    /// Cascade delete with two-phase locking: hold the personnel key, then
    /// the games key; back up both documents, mutate both, persist both; on
    /// any failure restore both from the backup and rethrow.
    async fn remove_personnel_member(&self, id: &str) -> Result<bool> {
        let _personnel_guard = self.locks.acquire(KEY_PERSONNEL).await;
        let _games_guard = self.locks.acquire(KEY_SAVED_GAMES).await;

        let personnel_backup: Vec<PersonnelMember> = self.read_doc(KEY_PERSONNEL).await?;
        let games_backup: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;

        if !personnel_backup.iter().any(|p| p.id == id) {
            return Ok(false);
        }

        let mut personnel = personnel_backup.clone();
        personnel.retain(|p| p.id != id);

        let mut games = games_backup.clone();
        let now = now_iso();
        for game in games.values_mut() {
            let before = game.game_personnel.len();
            game.game_personnel.retain(|link| link.personnel_id != id);
            if game.game_personnel.len() != before {
                game.updated_at = now.clone();
            }
        }

        self.write_doc(KEY_PERSONNEL, &personnel).await?;
        if let Err(err) = self.write_doc(KEY_SAVED_GAMES, &games).await {
            if let Err(restore_err) = self.write_doc(KEY_PERSONNEL, &personnel_backup).await {
                warn!("cascade rollback of personnel failed: {restore_err}");
            }
            if let Err(restore_err) = self.write_doc(KEY_SAVED_GAMES, &games_backup).await {
                warn!("cascade rollback of games failed: {restore_err}");
            }
            return Err(err);
        }
        Ok(true)
    }

    async fn upsert_personnel_member(&self, mut member: PersonnelMember) -> Result<PersonnelMember> {
        member.name = normalized_name(&member.name)?;
        self.locks
            .with_key_lock(KEY_PERSONNEL, async {
                let mut personnel: Vec<PersonnelMember> = self.read_doc(KEY_PERSONNEL).await?;
                ensure_unique_personnel(&personnel, &member.name, Some(&member.id))?;
                match personnel.iter_mut().find(|p| p.id == member.id) {
                    Some(existing) => *existing = member.clone(),
                    None => personnel.push(member.clone()),
                }
                self.write_doc(KEY_PERSONNEL, &personnel).await
            })
            .await?;
        Ok(member)
    }

    // ── Games ────────────────────────────────────────────────────────────

    async fn get_games(&self) -> Result<HashMap<String, AppState>> {
        self.read_doc(KEY_SAVED_GAMES).await
    }

    async fn get_game_by_id(&self, id: &str) -> Result<Option<AppState>> {
        let games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
        Ok(games.get(id).cloned())
    }

    async fn create_game(&self, new: NewGame) -> Result<AppState> {
        let settings: Option<AppSettings> = self.read_doc(KEY_APP_SETTINGS).await?;
        let team_name = new
            .team_name
            .unwrap_or_else(|| settings.map(|s| s.last_home_team_name).unwrap_or_default());
        let now = now_iso();
        let game = AppState {
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
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                games.insert(game.id.clone(), game.clone());
                self.write_doc(KEY_SAVED_GAMES, &games).await
            })
            .await?;
        Ok(game)
    }

    async fn save_game(&self, id: &str, mut state: AppState) -> Result<AppState> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                state.id = id.to_string();
                match games.get(id) {
                    Some(existing) => {
                        state.created_at = existing.created_at.clone();
                        state.version = existing.version + 1;
                    }
                    None => {
                        state.version = state.version.max(1);
                    }
                }
                state.updated_at = now_iso();
                games.insert(id.to_string(), state.clone());
                self.write_doc(KEY_SAVED_GAMES, &games).await?;
                Ok(state)
            })
            .await
    }

    async fn save_all_games(&self, games: HashMap<String, AppState>) -> Result<()> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut normalized = games;
                for (id, state) in normalized.iter_mut() {
                    state.id = id.clone();
                }
                self.write_doc(KEY_SAVED_GAMES, &normalized).await
            })
            .await
    }

    async fn delete_game(&self, id: &str) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                if games.remove(id).is_none() {
                    return Ok(false);
                }
                self.write_doc(KEY_SAVED_GAMES, &games).await?;
                Ok(true)
            })
            .await
    }

    // ── Game events ──────────────────────────────────────────────────────

    async fn add_game_event(&self, game_id: &str, event: GameEvent) -> Result<Option<AppState>> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                let Some(game) = games.get_mut(game_id) else {
                    return Ok(None);
                };
                game.game_events.push(event);
                game.updated_at = now_iso();
                game.version += 1;
                let updated = game.clone();
                self.write_doc(KEY_SAVED_GAMES, &games).await?;
                Ok(Some(updated))
            })
            .await
    }

    async fn update_game_event(
        &self,
        game_id: &str,
        index: usize,
        event: GameEvent,
    ) -> Result<Option<AppState>> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                let Some(game) = games.get_mut(game_id) else {
                    return Ok(None);
                };
                if index >= game.game_events.len() {
                    return Ok(None);
                }
                game.game_events[index] = event;
                game.updated_at = now_iso();
                game.version += 1;
                let updated = game.clone();
                self.write_doc(KEY_SAVED_GAMES, &games).await?;
                Ok(Some(updated))
            })
            .await
    }

    async fn remove_game_event(&self, game_id: &str, index: usize) -> Result<Option<AppState>> {
        self.locks
            .with_key_lock(KEY_SAVED_GAMES, async {
                let mut games: HashMap<String, AppState> = self.read_doc(KEY_SAVED_GAMES).await?;
                let Some(game) = games.get_mut(game_id) else {
                    return Ok(None);
                };
                if index >= game.game_events.len() {
                    return Ok(None);
                }
                game.game_events.remove(index);
                game.updated_at = now_iso();
                game.version += 1;
                let updated = game.clone();
                self.write_doc(KEY_SAVED_GAMES, &games).await?;
                Ok(Some(updated))
            })
            .await
    }

    // ── Player adjustments ───────────────────────────────────────────────

    async fn get_player_adjustments(&self, player_id: &str) -> Result<Vec<PlayerAdjustment>> {
        let adjustments: Vec<PlayerAdjustment> = self.read_doc(KEY_PLAYER_ADJUSTMENTS).await?;
        Ok(adjustments
            .into_iter()
            .filter(|a| a.player_id == player_id)
            .collect())
    }

    async fn add_player_adjustment(&self, new: NewPlayerAdjustment) -> Result<PlayerAdjustment> {
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
        self.locks
            .with_key_lock(KEY_PLAYER_ADJUSTMENTS, async {
                let mut adjustments: Vec<PlayerAdjustment> =
                    self.read_doc(KEY_PLAYER_ADJUSTMENTS).await?;
                adjustments.push(adjustment.clone());
                self.write_doc(KEY_PLAYER_ADJUSTMENTS, &adjustments).await
            })
            .await?;
        Ok(adjustment)
    }

    async fn update_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
        patch: AdjustmentPatch,
    ) -> Result<Option<PlayerAdjustment>> {
        self.locks
            .with_key_lock(KEY_PLAYER_ADJUSTMENTS, async {
                let mut adjustments: Vec<PlayerAdjustment> =
                    self.read_doc(KEY_PLAYER_ADJUSTMENTS).await?;
                let Some(adjustment) = adjustments
                    .iter_mut()
                    .find(|a| a.id == adjustment_id && a.player_id == player_id)
                else {
                    return Ok(None);
                };
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
                let updated = adjustment.clone();
                self.write_doc(KEY_PLAYER_ADJUSTMENTS, &adjustments).await?;
                Ok(Some(updated))
            })
            .await
    }

    async fn delete_player_adjustment(
        &self,
        player_id: &str,
        adjustment_id: &str,
    ) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_PLAYER_ADJUSTMENTS, async {
                let mut adjustments: Vec<PlayerAdjustment> =
                    self.read_doc(KEY_PLAYER_ADJUSTMENTS).await?;
                let before = adjustments.len();
                adjustments.retain(|a| !(a.id == adjustment_id && a.player_id == player_id));
                if adjustments.len() == before {
                    return Ok(false);
                }
                self.write_doc(KEY_PLAYER_ADJUSTMENTS, &adjustments).await?;
                Ok(true)
            })
            .await
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: PlayerAdjustment,
    ) -> Result<PlayerAdjustment> {
        self.locks
            .with_key_lock(KEY_PLAYER_ADJUSTMENTS, async {
                let mut adjustments: Vec<PlayerAdjustment> =
                    self.read_doc(KEY_PLAYER_ADJUSTMENTS).await?;
                match adjustments.iter_mut().find(|a| a.id == adjustment.id) {
                    Some(existing) => *existing = adjustment.clone(),
                    None => adjustments.push(adjustment.clone()),
                }
                self.write_doc(KEY_PLAYER_ADJUSTMENTS, &adjustments).await
            })
            .await?;
        Ok(adjustment)
    }

    // ── Warmup plan ──────────────────────────────────────────────────────

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>> {
        self.read_doc(KEY_WARMUP_PLAN).await
    }

    async fn save_warmup_plan(&self, mut plan: WarmupPlan) -> Result<WarmupPlan> {
        plan.id = WARMUP_PLAN_ID.to_string();
        plan.is_default = false;
        self.locks
            .with_key_lock(KEY_WARMUP_PLAN, async {
                let existing: Option<WarmupPlan> = self.read_doc(KEY_WARMUP_PLAN).await?;
                if let Some(existing) = existing {
                    plan.created_at = existing.created_at;
                }
                plan.updated_at = now_iso();
                self.write_doc(KEY_WARMUP_PLAN, &Some(plan.clone())).await?;
                Ok(plan)
            })
            .await
    }

    async fn delete_warmup_plan(&self) -> Result<bool> {
        self.locks
            .with_key_lock(KEY_WARMUP_PLAN, async {
                let existing: Option<WarmupPlan> = self.read_doc(KEY_WARMUP_PLAN).await?;
                if existing.is_none() {
                    return Ok(false);
                }
                self.kv.remove(KEY_WARMUP_PLAN).await?;
                Ok(true)
            })
            .await
    }

    // ── Settings ─────────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<AppSettings> {
        Ok(self
            .read_doc::<Option<AppSettings>>(KEY_APP_SETTINGS)
            .await?
            .unwrap_or_default())
    }

    async fn save_settings(&self, settings: AppSettings) -> Result<AppSettings> {
        self.locks
            .with_key_lock(KEY_APP_SETTINGS, async {
                self.write_doc(KEY_APP_SETTINGS, &Some(settings.clone()))
                    .await?;
                Ok(settings)
            })
            .await
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<AppSettings> {
        self.locks
            .with_key_lock(KEY_APP_SETTINGS, async {
                let mut settings = self
                    .read_doc::<Option<AppSettings>>(KEY_APP_SETTINGS)
                    .await?
                    .unwrap_or_default();
                settings.apply_patch(patch);
                self.write_doc(KEY_APP_SETTINGS, &Some(settings.clone()))
                    .await?;
                Ok(settings)
            })
            .await
    }

    // ── Timer state ──────────────────────────────────────────────────────

    async fn get_timer_state(&self) -> Result<Option<TimerState>> {
        self.read_doc(TIMER_STATE_KEY).await
    }

    async fn save_timer_state(&self, state: TimerState) -> Result<()> {
        self.write_doc(TIMER_STATE_KEY, &Some(state)).await
    }

    async fn clear_timer_state(&self) -> Result<()> {
        self.kv.remove(TIMER_STATE_KEY).await
    }
}
