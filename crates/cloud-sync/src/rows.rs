//! Wire rows (snake_case) and their mapping to domain objects.
//!
//! Empty-string association ids are the domain's "no association" marker;
//! they normalize to `NULL` on write and back to empty string on read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use matchops_core::model::{
    AppState, PersonnelMember, PersonnelRole, Player, PlayerAdjustment, Season, Team,
    TeamRosterEntry, Tournament, WarmupPlan, WarmupSection,
};
use matchops_core::{Result, StoreError};

pub(crate) fn enum_to_wire<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_wire<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_str(&format!("\"{value}\""))
        .map_err(|err| StoreError::Backend(format!("unrecognized wire enum '{value}': {err}")))
}

pub(crate) fn none_if_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn empty_if_none(value: Option<String>) -> String {
    value.unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub jersey_number: Option<String>,
    pub is_goalie: bool,
    pub received_fair_play_card: bool,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PlayerRow {
    pub fn from_domain(player: &Player, user_id: &str) -> Self {
        Self {
            id: player.id.clone(),
            user_id: user_id.to_string(),
            name: player.name.clone(),
            nickname: player.nickname.clone(),
            jersey_number: player.jersey_number.clone(),
            is_goalie: player.is_goalie,
            received_fair_play_card: player.received_fair_play_card,
            color: player.color.clone(),
            notes: player.notes.clone(),
            created_at: player.created_at.clone(),
            updated_at: player.updated_at.clone(),
        }
    }

    pub fn into_domain(self) -> Player {
        Player {
            id: self.id,
            name: self.name,
            nickname: self.nickname,
            jersey_number: self.jersey_number,
            is_goalie: self.is_goalie,
            received_fair_play_card: self.received_fair_play_card,
            color: self.color,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub age_group: Option<String>,
    pub game_type: Option<String>,
    pub is_archived: bool,
    pub bound_season_id: Option<String>,
    pub bound_tournament_id: Option<String>,
    pub bound_tournament_series_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TeamRow {
    pub fn from_domain(team: &Team, user_id: &str) -> Self {
        Self {
            id: team.id.clone(),
            user_id: user_id.to_string(),
            name: team.name.clone(),
            color: team.color.clone(),
            notes: team.notes.clone(),
            age_group: team.age_group.clone(),
            game_type: team.game_type.clone(),
            is_archived: team.is_archived,
            bound_season_id: team.bound_season_id.clone(),
            bound_tournament_id: team.bound_tournament_id.clone(),
            bound_tournament_series_id: team.bound_tournament_series_id.clone(),
            created_at: team.created_at.clone(),
            updated_at: team.updated_at.clone(),
        }
    }

    pub fn into_domain(self) -> Team {
        Team {
            id: self.id,
            name: self.name,
            color: self.color,
            notes: self.notes,
            age_group: self.age_group,
            game_type: self.game_type,
            is_archived: self.is_archived,
            bound_season_id: self.bound_season_id,
            bound_tournament_id: self.bound_tournament_id,
            bound_tournament_series_id: self.bound_tournament_series_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRosterRow {
    pub team_id: String,
    pub user_id: String,
    pub player_id: String,
    /// Roster order within the team.
    pub position: i32,
    pub name: String,
    pub nickname: Option<String>,
    pub jersey_number: Option<String>,
    pub is_goalie: bool,
    pub received_fair_play_card: bool,
    pub color: Option<String>,
    pub notes: Option<String>,
}

impl TeamRosterRow {
    pub fn from_domain(team_id: &str, user_id: &str, position: i32, entry: &TeamRosterEntry) -> Self {
        Self {
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            player_id: entry.player_id.clone(),
            position,
            name: entry.name.clone(),
            nickname: entry.nickname.clone(),
            jersey_number: entry.jersey_number.clone(),
            is_goalie: entry.is_goalie,
            received_fair_play_card: entry.received_fair_play_card,
            color: entry.color.clone(),
            notes: entry.notes.clone(),
        }
    }

    pub fn into_domain(self) -> TeamRosterEntry {
        TeamRosterEntry {
            player_id: self.player_id,
            name: self.name,
            nickname: self.nickname,
            jersey_number: self.jersey_number,
            is_goalie: self.is_goalie,
            received_fair_play_card: self.received_fair_play_card,
            color: self.color,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub club_season: Option<String>,
    pub game_type: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
    pub league_id: Option<String>,
    pub custom_league_name: Option<String>,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl SeasonRow {
    pub fn from_domain(season: &Season, user_id: &str) -> Self {
        Self {
            id: season.id.clone(),
            user_id: user_id.to_string(),
            name: season.name.clone(),
            start_date: season.start_date.clone(),
            end_date: season.end_date.clone(),
            club_season: season.club_season.clone(),
            game_type: season.game_type.clone(),
            gender: season.gender.clone(),
            age_group: season.age_group.clone(),
            league_id: season.league_id.clone(),
            custom_league_name: season.custom_league_name.clone(),
            is_archived: season.is_archived,
            created_at: season.created_at.clone(),
            updated_at: season.updated_at.clone(),
        }
    }

    pub fn into_domain(self) -> Season {
        Season {
            id: self.id,
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
            club_season: self.club_season,
            game_type: self.game_type,
            gender: self.gender,
            age_group: self.age_group,
            league_id: self.league_id,
            custom_league_name: self.custom_league_name,
            is_archived: self.is_archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub level: Option<String>,
    pub series_id: Option<String>,
    pub club_season: Option<String>,
    pub game_type: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TournamentRow {
    pub fn from_domain(tournament: &Tournament, user_id: &str) -> Self {
        Self {
            id: tournament.id.clone(),
            user_id: user_id.to_string(),
            name: tournament.name.clone(),
            start_date: tournament.start_date.clone(),
            end_date: tournament.end_date.clone(),
            location: tournament.location.clone(),
            level: tournament.level.clone(),
            series_id: tournament.series_id.clone(),
            club_season: tournament.club_season.clone(),
            game_type: tournament.game_type.clone(),
            gender: tournament.gender.clone(),
            age_group: tournament.age_group.clone(),
            is_archived: tournament.is_archived,
            created_at: tournament.created_at.clone(),
            updated_at: tournament.updated_at.clone(),
        }
    }

    pub fn into_domain(self) -> Tournament {
        Tournament {
            id: self.id,
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
            location: self.location,
            level: self.level,
            series_id: self.series_id,
            club_season: self.club_season,
            game_type: self.game_type,
            gender: self.gender,
            age_group: self.age_group,
            is_archived: self.is_archived,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonnelRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub certifications: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PersonnelRow {
    pub fn from_domain(member: &PersonnelMember, user_id: &str) -> Result<Self> {
        Ok(Self {
            id: member.id.clone(),
            user_id: user_id.to_string(),
            name: member.name.clone(),
            role: enum_to_wire(&member.role)?,
            email: member.email.clone(),
            phone: member.phone.clone(),
            certifications: member.certifications.clone(),
            notes: member.notes.clone(),
            created_at: member.created_at.clone(),
            updated_at: member.updated_at.clone(),
        })
    }

    pub fn into_domain(self) -> Result<PersonnelMember> {
        let role: PersonnelRole = enum_from_wire(&self.role)?;
        Ok(PersonnelMember {
            id: self.id,
            name: self.name,
            role,
            email: self.email,
            phone: self.phone,
            certifications: self.certifications,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Games travel as one row per game: scalar columns for the optimistic-lock
/// version and the association ids, plus the full state document. The
/// index-based event contract stays inside `state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRow {
    pub id: String,
    pub user_id: String,
    pub season_id: Option<String>,
    pub tournament_id: Option<String>,
    pub version: i64,
    pub state: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl GameRow {
    pub fn from_domain(state: &AppState, user_id: &str) -> Result<Self> {
        Ok(Self {
            id: state.id.clone(),
            user_id: user_id.to_string(),
            season_id: none_if_empty(&state.season_id),
            tournament_id: none_if_empty(&state.tournament_id),
            version: state.version,
            state: serde_json::to_value(state)?,
            created_at: state.created_at.clone(),
            updated_at: state.updated_at.clone(),
        })
    }

    pub fn into_domain(self) -> Result<AppState> {
        let mut state: AppState = serde_json::from_value(self.state)
            .map_err(|err| StoreError::Backend(format!("unreadable game state row: {err}")))?;
        state.id = self.id;
        state.version = self.version;
        state.season_id = empty_if_none(self.season_id);
        state.tournament_id = empty_if_none(self.tournament_id);
        Ok(state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRow {
    pub id: String,
    pub user_id: String,
    pub player_id: String,
    pub games_played_delta: i32,
    pub goals_delta: i32,
    pub assists_delta: i32,
    pub applied_at: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AdjustmentRow {
    pub fn from_domain(adjustment: &PlayerAdjustment, user_id: &str) -> Self {
        Self {
            id: adjustment.id.clone(),
            user_id: user_id.to_string(),
            player_id: adjustment.player_id.clone(),
            games_played_delta: adjustment.games_played_delta,
            goals_delta: adjustment.goals_delta,
            assists_delta: adjustment.assists_delta,
            applied_at: adjustment.applied_at.clone(),
            note: adjustment.note.clone(),
            created_at: adjustment.created_at.clone(),
            updated_at: adjustment.updated_at.clone(),
        }
    }

    pub fn into_domain(self) -> PlayerAdjustment {
        PlayerAdjustment {
            id: self.id,
            player_id: self.player_id,
            games_played_delta: self.games_played_delta,
            goals_delta: self.goals_delta,
            assists_delta: self.assists_delta,
            applied_at: self.applied_at,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupPlanRow {
    pub id: String,
    pub user_id: String,
    pub version: i64,
    pub last_modified: String,
    pub is_default: bool,
    pub sections: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl WarmupPlanRow {
    pub fn from_domain(plan: &WarmupPlan, user_id: &str) -> Result<Self> {
        Ok(Self {
            id: plan.id.clone(),
            user_id: user_id.to_string(),
            version: plan.version,
            last_modified: plan.last_modified.clone(),
            is_default: plan.is_default,
            sections: serde_json::to_value(&plan.sections)?,
            created_at: plan.created_at.clone(),
            updated_at: plan.updated_at.clone(),
        })
    }

    pub fn into_domain(self) -> Result<WarmupPlan> {
        let sections: Vec<WarmupSection> = serde_json::from_value(self.sections)
            .map_err(|err| StoreError::Backend(format!("unreadable warmup sections: {err}")))?;
        Ok(WarmupPlan {
            id: self.id,
            version: self.version,
            last_modified: self.last_modified,
            is_default: self.is_default,
            sections,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsRow {
    pub user_id: String,
    pub language: String,
    pub current_game_id: Option<String>,
    pub last_home_team_name: String,
    pub has_seen_app_guide: bool,
    pub use_demand_correction: bool,
    pub has_configured_season_dates: bool,
    pub club_season_start: Option<String>,
    pub club_season_end: Option<String>,
    pub updated_at: String,
}

impl SettingsRow {
    pub fn from_domain(settings: &matchops_core::model::AppSettings, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            language: settings.language.clone(),
            current_game_id: settings.current_game_id.clone(),
            last_home_team_name: settings.last_home_team_name.clone(),
            has_seen_app_guide: settings.has_seen_app_guide,
            use_demand_correction: settings.use_demand_correction,
            has_configured_season_dates: settings.has_configured_season_dates,
            club_season_start: settings.club_season_start.clone(),
            club_season_end: settings.club_season_end.clone(),
            updated_at: matchops_core::model::now_iso(),
        }
    }

    pub fn into_domain(self) -> matchops_core::model::AppSettings {
        matchops_core::model::AppSettings {
            language: self.language,
            current_game_id: self.current_game_id,
            last_home_team_name: self.last_home_team_name,
            has_seen_app_guide: self.has_seen_app_guide,
            use_demand_correction: self.use_demand_correction,
            has_configured_season_dates: self.has_configured_season_dates,
            club_season_start: self.club_season_start,
            club_season_end: self.club_season_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchops_core::model::GameStatus;

    #[test]
    fn empty_association_ids_normalize_to_null_and_back() {
        let state = AppState {
            id: "game_1".into(),
            team_name: "Eagles".into(),
            opponent_name: "Rovers".into(),
            game_date: "2026-05-01".into(),
            home_score: 0,
            away_score: 0,
            current_period: 1,
            game_status: GameStatus::NotStarted,
            game_events: vec![],
            available_players: vec![],
            players_on_field: vec![],
            selected_player_ids: vec![],
            period_duration_minutes: 25,
            number_of_periods: 2,
            season_id: String::new(),
            tournament_id: "tournament_9".into(),
            tournament_level: None,
            final_placement: None,
            game_personnel: vec![],
            game_notes: None,
            version: 1,
            created_at: "2026-05-01T10:00:00Z".into(),
            updated_at: "2026-05-01T10:00:00Z".into(),
        };
        let row = GameRow::from_domain(&state, "user1").unwrap();
        assert_eq!(row.season_id, None);
        assert_eq!(row.tournament_id.as_deref(), Some("tournament_9"));

        let back = row.into_domain().unwrap();
        assert_eq!(back.season_id, "");
        assert_eq!(back.tournament_id, "tournament_9");
    }

    #[test]
    fn personnel_role_round_trips_through_wire_string() {
        let wire = enum_to_wire(&PersonnelRole::GoalkeeperCoach).unwrap();
        assert_eq!(wire, "goalkeeperCoach");
        let back: PersonnelRole = enum_from_wire(&wire).unwrap();
        assert_eq!(back, PersonnelRole::GoalkeeperCoach);
    }
}
