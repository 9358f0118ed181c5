//! Master-roster player model.

use serde::{Deserialize, Serialize};

/// A player on the coach's master roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
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
    pub created_at: String,
    pub updated_at: String,
}

/// Creation payload; the store assigns id and timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayer {
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub jersey_number: Option<String>,
    #[serde(default)]
    pub is_goalie: bool,
    #[serde(default)]
    pub received_fair_play_card: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub jersey_number: Option<String>,
    pub is_goalie: Option<bool>,
    pub received_fair_play_card: Option<bool>,
    pub color: Option<String>,
    pub notes: Option<String>,
}
