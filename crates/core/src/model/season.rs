//! Seasons and tournaments.

use serde::{Deserialize, Serialize};

use super::validation::folded_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Derived from `start_date` and the configured season window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_league_name: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Season {
    pub fn uniqueness_key(&self) -> SeasonKey {
        SeasonKey {
            name: folded_name(&self.name),
            club_season: self.club_season.clone(),
            game_type: self.game_type.clone(),
            gender: self.gender.clone(),
            age_group: self.age_group.clone(),
            league_id: self.league_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeasonKey {
    pub name: String,
    pub club_season: Option<String>,
    pub game_type: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
    pub league_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSeason {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub league_id: Option<String>,
    #[serde(default)]
    pub custom_league_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_season: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Tournament {
    pub fn uniqueness_key(&self) -> TournamentKey {
        TournamentKey {
            name: folded_name(&self.name),
            club_season: self.club_season.clone(),
            game_type: self.game_type.clone(),
            gender: self.gender.clone(),
            age_group: self.age_group.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TournamentKey {
    pub name: String,
    pub club_season: Option<String>,
    pub game_type: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTournament {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
}
