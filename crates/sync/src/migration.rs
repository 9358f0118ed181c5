//! Bidirectional bulk copy between two data stores.
//!
//! Used when a user first signs in to cloud (local → remote) or reverts to
//! local (remote → local). Copies are upserts keyed by entity id, so a
//! re-run cannot duplicate rows. Progress markers make a crashed run
//! resumable; a destination snapshot taken at start makes a fatally failed
//! run reversible.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use matchops_core::model::{
    now_iso, AppSettings, AppState, PersonnelMember, Player, PlayerAdjustment, Season, Team,
    TeamRosterEntry, Tournament, WarmupPlan,
};
use matchops_core::sync::SyncEntityKind;
use matchops_core::{DataStore, Result, StoreError};
use matchops_storage_kv::KvAdapter;

/// Durable marker: JSON list of completed step labels.
pub const KEY_MIGRATION_PROGRESS: &str = "migrationProgress";
/// Session-scoped flag: set while a run is active, cleared only on success,
/// so the UI can detect an interrupted migration on next load.
pub const KEY_MIGRATION_IN_PROGRESS: &str = "migrationInProgress";

fn completion_key(user_id: &str) -> String {
    format!("migrationCompleted_{user_id}")
}

/// Copy order. Referenced entities land before their referrers.
const STEPS: [SyncEntityKind; 10] = [
    SyncEntityKind::Player,
    SyncEntityKind::Team,
    SyncEntityKind::TeamRoster,
    SyncEntityKind::Season,
    SyncEntityKind::Tournament,
    SyncEntityKind::Personnel,
    SyncEntityKind::Game,
    SyncEntityKind::PlayerAdjustment,
    SyncEntityKind::WarmupPlan,
    SyncEntityKind::Settings,
];

fn step_label(step: SyncEntityKind) -> String {
    serde_json::to_string(&step)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationDirection {
    LocalToCloud,
    CloudToLocal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub step: String,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub copied: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub copied: HashMap<String, usize>,
}

/// Everything needed to put the destination back the way it was.
struct DestinationSnapshot {
    players: Vec<Player>,
    teams: Vec<Team>,
    rosters: HashMap<String, Vec<TeamRosterEntry>>,
    seasons: Vec<Season>,
    tournaments: Vec<Tournament>,
    personnel: Vec<PersonnelMember>,
    games: HashMap<String, AppState>,
    adjustments: Vec<PlayerAdjustment>,
    warmup_plan: Option<WarmupPlan>,
    settings: AppSettings,
}

type ProgressListener = Box<dyn Fn(&MigrationProgress) + Send + Sync>;

pub struct MigrationEngine {
    direction: MigrationDirection,
    source: Arc<dyn DataStore>,
    destination: Arc<dyn DataStore>,
    /// Durable per-user flags and progress markers.
    flags: Arc<dyn KvAdapter>,
    /// Session-scoped storage for the in-progress flag.
    session: Arc<dyn KvAdapter>,
    on_progress: StdMutex<Option<ProgressListener>>,
}

impl MigrationEngine {
    pub fn new(
        direction: MigrationDirection,
        source: Arc<dyn DataStore>,
        destination: Arc<dyn DataStore>,
        flags: Arc<dyn KvAdapter>,
        session: Arc<dyn KvAdapter>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
            flags,
            session,
            on_progress: StdMutex::new(None),
        }
    }

    pub fn on_progress(&self, listener: impl Fn(&MigrationProgress) + Send + Sync + 'static) {
        *self.on_progress.lock().expect("progress lock") = Some(Box::new(listener));
    }

    fn emit_progress(&self, progress: &MigrationProgress) {
        if let Some(listener) = self.on_progress.lock().expect("progress lock").as_ref() {
            listener(progress);
        }
    }

    /// One-time flag check; a completed migration refuses to re-run until
    /// the flag is cleared.
    pub async fn has_completed(&self, user_id: &str) -> Result<bool> {
        Ok(self.flags.get(&completion_key(user_id)).await?.is_some())
    }

    pub async fn clear_completion_flag(&self, user_id: &str) -> Result<()> {
        self.flags.remove(&completion_key(user_id)).await
    }

    pub async fn run(&self, user_id: &str) -> Result<MigrationReport> {
        if self.has_completed(user_id).await? {
            return Err(StoreError::Validation(format!(
                "migration already completed for user '{user_id}'"
            )));
        }

        self.session
            .set(KEY_MIGRATION_IN_PROGRESS, b"1".to_vec())
            .await?;

        let result = self.run_inner(user_id).await;

        // Both stores close regardless of outcome.
        self.source.close().await;
        self.destination.close().await;
        result
    }

    async fn run_inner(&self, user_id: &str) -> Result<MigrationReport> {
        self.source.initialize().await?;
        self.destination.initialize().await?;

        let snapshot = self.capture_destination().await?;

        match self.copy_all().await {
            Ok(report) => {
                self.flags
                    .set(&completion_key(user_id), now_iso().into_bytes())
                    .await?;
                self.flags.remove(KEY_MIGRATION_PROGRESS).await?;
                self.session.remove(KEY_MIGRATION_IN_PROGRESS).await?;
                info!(
                    "migration {:?} completed: {} steps",
                    self.direction,
                    report.copied.len()
                );
                Ok(report)
            }
            Err(err) if err.is_transient() => {
                // Resumable: progress markers stay, nothing to roll back.
                warn!("migration interrupted by transient failure: {err}");
                Err(err)
            }
            Err(err) => {
                warn!("migration failed fatally, rolling back destination: {err}");
                if let Err(restore_err) = self.restore_destination(&snapshot).await {
                    warn!("destination rollback incomplete: {restore_err}");
                }
                self.flags.remove(KEY_MIGRATION_PROGRESS).await.ok();
                Err(err)
            }
        }
    }

    async fn completed_steps(&self) -> Result<HashSet<String>> {
        match self.flags.get(KEY_MIGRATION_PROGRESS).await? {
            Some(bytes) => match serde_json::from_slice::<Vec<String>>(&bytes) {
                Ok(steps) => Ok(steps.into_iter().collect()),
                Err(err) => {
                    warn!("migration progress marker unreadable, restarting: {err}");
                    Ok(HashSet::new())
                }
            },
            None => Ok(HashSet::new()),
        }
    }

    async fn mark_step_complete(&self, completed: &mut Vec<String>, label: String) -> Result<()> {
        completed.push(label);
        self.flags
            .set(KEY_MIGRATION_PROGRESS, serde_json::to_vec(completed)?)
            .await
    }

    async fn copy_all(&self) -> Result<MigrationReport> {
        let already_done = self.completed_steps().await?;
        let mut completed: Vec<String> = already_done.iter().cloned().collect();
        let mut report = MigrationReport::default();

        for (index, step) in STEPS.iter().enumerate() {
            let label = step_label(*step);
            if already_done.contains(&label) {
                continue;
            }
            let copied = self.copy_step(*step).await?;
            self.mark_step_complete(&mut completed, label.clone()).await?;
            report.copied.insert(label.clone(), copied);
            self.emit_progress(&MigrationProgress {
                step: label,
                completed_steps: index + 1,
                total_steps: STEPS.len(),
                copied,
            });
        }
        Ok(report)
    }

    async fn copy_step(&self, step: SyncEntityKind) -> Result<usize> {
        match step {
            SyncEntityKind::Player => {
                let players = self.source.get_players().await?;
                let count = players.len();
                for player in players {
                    self.destination.upsert_player(player).await?;
                }
                Ok(count)
            }
            SyncEntityKind::Team => {
                let teams = self.source.get_teams(true).await?;
                let count = teams.len();
                for team in teams {
                    self.destination.upsert_team(team).await?;
                }
                Ok(count)
            }
            SyncEntityKind::TeamRoster => {
                let rosters = self.source.get_all_team_rosters().await?;
                let count = rosters.len();
                for (team_id, roster) in rosters {
                    self.destination.set_team_roster(&team_id, roster).await?;
                }
                Ok(count)
            }
            SyncEntityKind::Season => {
                let seasons = self.source.get_seasons(true).await?;
                let count = seasons.len();
                for season in seasons {
                    self.destination.upsert_season(season).await?;
                }
                Ok(count)
            }
            SyncEntityKind::Tournament => {
                let tournaments = self.source.get_tournaments(true).await?;
                let count = tournaments.len();
                for tournament in tournaments {
                    self.destination.upsert_tournament(tournament).await?;
                }
                Ok(count)
            }
            SyncEntityKind::Personnel => {
                let personnel = self.source.get_all_personnel().await?;
                let count = personnel.len();
                for member in personnel {
                    self.destination.upsert_personnel_member(member).await?;
                }
                Ok(count)
            }
            SyncEntityKind::Game => {
                let games = self.source.get_games().await?;
                let count = games.len();
                self.destination.save_all_games(games).await?;
                Ok(count)
            }
            SyncEntityKind::PlayerAdjustment => {
                let mut count = 0;
                for player in self.source.get_players().await? {
                    for adjustment in self.source.get_player_adjustments(&player.id).await? {
                        self.destination.upsert_player_adjustment(adjustment).await?;
                        count += 1;
                    }
                }
                Ok(count)
            }
            SyncEntityKind::WarmupPlan => match self.source.get_warmup_plan().await? {
                Some(plan) => {
                    self.destination.save_warmup_plan(plan).await?;
                    Ok(1)
                }
                None => Ok(0),
            },
            SyncEntityKind::Settings => {
                let settings = self.source.get_settings().await?;
                self.destination.save_settings(settings).await?;
                Ok(1)
            }
        }
    }

    async fn capture_destination(&self) -> Result<DestinationSnapshot> {
        let players = self.destination.get_players().await?;
        let mut adjustments = Vec::new();
        for player in &players {
            adjustments.extend(self.destination.get_player_adjustments(&player.id).await?);
        }
        Ok(DestinationSnapshot {
            teams: self.destination.get_teams(true).await?,
            rosters: self.destination.get_all_team_rosters().await?,
            seasons: self.destination.get_seasons(true).await?,
            tournaments: self.destination.get_tournaments(true).await?,
            personnel: self.destination.get_all_personnel().await?,
            games: self.destination.get_games().await?,
            warmup_plan: self.destination.get_warmup_plan().await?,
            settings: self.destination.get_settings().await?,
            players,
            adjustments,
        })
    }

    /// Put the destination back to the snapshot: remove everything the run
    /// added, re-upsert everything it overwrote.
    async fn restore_destination(&self, snapshot: &DestinationSnapshot) -> Result<()> {
        let snapshot_player_ids: HashSet<&str> =
            snapshot.players.iter().map(|p| p.id.as_str()).collect();
        for player in self.destination.get_players().await? {
            if !snapshot_player_ids.contains(player.id.as_str()) {
                self.destination.delete_player(&player.id).await?;
            }
        }
        for player in &snapshot.players {
            self.destination.upsert_player(player.clone()).await?;
        }

        let snapshot_team_ids: HashSet<&str> =
            snapshot.teams.iter().map(|t| t.id.as_str()).collect();
        for team in self.destination.get_teams(true).await? {
            if !snapshot_team_ids.contains(team.id.as_str()) {
                self.destination.delete_team(&team.id).await?;
            }
        }
        for team in &snapshot.teams {
            self.destination.upsert_team(team.clone()).await?;
        }

        for (team_id, _) in self.destination.get_all_team_rosters().await? {
            if !snapshot.rosters.contains_key(&team_id) {
                self.destination.set_team_roster(&team_id, Vec::new()).await?;
            }
        }
        for (team_id, roster) in &snapshot.rosters {
            self.destination
                .set_team_roster(team_id, roster.clone())
                .await?;
        }

        let snapshot_season_ids: HashSet<&str> =
            snapshot.seasons.iter().map(|s| s.id.as_str()).collect();
        for season in self.destination.get_seasons(true).await? {
            if !snapshot_season_ids.contains(season.id.as_str()) {
                self.destination.delete_season(&season.id).await?;
            }
        }
        for season in &snapshot.seasons {
            self.destination.upsert_season(season.clone()).await?;
        }

        let snapshot_tournament_ids: HashSet<&str> =
            snapshot.tournaments.iter().map(|t| t.id.as_str()).collect();
        for tournament in self.destination.get_tournaments(true).await? {
            if !snapshot_tournament_ids.contains(tournament.id.as_str()) {
                self.destination.delete_tournament(&tournament.id).await?;
            }
        }
        for tournament in &snapshot.tournaments {
            self.destination.upsert_tournament(tournament.clone()).await?;
        }

        let snapshot_personnel_ids: HashSet<&str> =
            snapshot.personnel.iter().map(|p| p.id.as_str()).collect();
        for member in self.destination.get_all_personnel().await? {
            if !snapshot_personnel_ids.contains(member.id.as_str()) {
                self.destination.remove_personnel_member(&member.id).await?;
            }
        }
        for member in &snapshot.personnel {
            self.destination
                .upsert_personnel_member(member.clone())
                .await?;
        }

        let snapshot_game_ids: HashSet<&str> =
            snapshot.games.keys().map(String::as_str).collect();
        for game_id in self.destination.get_games().await?.into_keys() {
            if !snapshot_game_ids.contains(game_id.as_str()) {
                self.destination.delete_game(&game_id).await?;
            }
        }
        self.destination
            .save_all_games(snapshot.games.clone())
            .await?;

        let snapshot_adjustment_ids: HashSet<&str> =
            snapshot.adjustments.iter().map(|a| a.id.as_str()).collect();
        for player in self.destination.get_players().await? {
            for adjustment in self.destination.get_player_adjustments(&player.id).await? {
                if !snapshot_adjustment_ids.contains(adjustment.id.as_str()) {
                    self.destination
                        .delete_player_adjustment(&adjustment.player_id, &adjustment.id)
                        .await?;
                }
            }
        }
        for adjustment in &snapshot.adjustments {
            self.destination
                .upsert_player_adjustment(adjustment.clone())
                .await?;
        }

        match &snapshot.warmup_plan {
            Some(plan) => {
                self.destination.save_warmup_plan(plan.clone()).await?;
            }
            None => {
                self.destination.delete_warmup_plan().await?;
            }
        }

        self.destination
            .save_settings(snapshot.settings.clone())
            .await?;
        Ok(())
    }
}
