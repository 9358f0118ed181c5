//! Saved games: full per-game application state plus its ordered event log.

use serde::{Deserialize, Serialize};

use super::personnel::PersonnelRole;
use super::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    NotStarted,
    InProgress,
    PeriodEnd,
    GameEnd,
}

impl Default for GameStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameEventKind {
    Goal,
    OpponentGoal,
    Substitution,
    PeriodEnd,
    GameEnd,
    FairPlayCard,
}

/// One entry of a game's ordered event log. Events have no stable id; their
/// identity is `(game_id, array index)` and the index-based API is the
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub kind: GameEventKind,
    /// Seconds from kickoff.
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assister_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}

/// A personnel assignment on one game. Cleared by the Personnel cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePersonnelLink {
    pub personnel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<PersonnelRole>,
}

/// The full state of one saved game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub id: String,
    pub team_name: String,
    pub opponent_name: String,
    pub game_date: String,
    #[serde(default)]
    pub home_score: u32,
    #[serde(default)]
    pub away_score: u32,
    #[serde(default)]
    pub current_period: u32,
    #[serde(default)]
    pub game_status: GameStatus,
    #[serde(default)]
    pub game_events: Vec<GameEvent>,
    #[serde(default)]
    pub available_players: Vec<Player>,
    #[serde(default)]
    pub players_on_field: Vec<String>,
    #[serde(default)]
    pub selected_player_ids: Vec<String>,
    #[serde(default)]
    pub period_duration_minutes: u32,
    #[serde(default)]
    pub number_of_periods: u32,
    /// Empty string means "not associated with a season".
    #[serde(default)]
    pub season_id: String,
    /// Empty string means "not associated with a tournament".
    #[serde(default)]
    pub tournament_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_placement: Option<i32>,
    #[serde(default)]
    pub game_personnel: Vec<GamePersonnelLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_notes: Option<String>,
    /// Optimistic-lock version, bumped on every save.
    #[serde(default)]
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Creation payload; unspecified fields take game defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGame {
    #[serde(default)]
    pub team_name: Option<String>,
    pub opponent_name: String,
    pub game_date: String,
    #[serde(default)]
    pub available_players: Vec<Player>,
    #[serde(default)]
    pub selected_player_ids: Vec<String>,
    #[serde(default)]
    pub period_duration_minutes: Option<u32>,
    #[serde(default)]
    pub number_of_periods: Option<u32>,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default)]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub game_personnel: Vec<GamePersonnelLink>,
}

pub const DEFAULT_PERIOD_DURATION_MINUTES: u32 = 25;
pub const DEFAULT_NUMBER_OF_PERIODS: u32 = 2;
