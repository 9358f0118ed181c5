//! Teams and team rosters.

use serde::{Deserialize, Serialize};

use super::validation::folded_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_season_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_tournament_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_tournament_series_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Team {
    /// Composite uniqueness key: case-folded name plus every binding that
    /// scopes the name. Archived teams participate in the comparison.
    pub fn uniqueness_key(&self) -> TeamKey {
        TeamKey {
            name: folded_name(&self.name),
            game_type: self.game_type.clone(),
            bound_season_id: self.bound_season_id.clone(),
            bound_tournament_id: self.bound_tournament_id.clone(),
            bound_tournament_series_id: self.bound_tournament_series_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeamKey {
    pub name: String,
    pub game_type: Option<String>,
    pub bound_season_id: Option<String>,
    pub bound_tournament_id: Option<String>,
    pub bound_tournament_series_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub bound_season_id: Option<String>,
    #[serde(default)]
    pub bound_tournament_id: Option<String>,
    #[serde(default)]
    pub bound_tournament_series_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub age_group: Option<String>,
    pub game_type: Option<String>,
    pub is_archived: Option<bool>,
    pub bound_season_id: Option<String>,
    pub bound_tournament_id: Option<String>,
    pub bound_tournament_series_id: Option<String>,
}

/// Snapshot of a player at the moment of roster assignment. The roster is an
/// ordered set keyed by `player_id` within one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRosterEntry {
    pub player_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<String>,
    #[serde(default)]
    pub is_goalie: bool,
    #[serde(default)]
    pub received_fair_play_card: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
