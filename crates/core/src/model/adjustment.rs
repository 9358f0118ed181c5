//! External-stat correction rows scoped to one player.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAdjustment {
    pub id: String,
    pub player_id: String,
    #[serde(default)]
    pub games_played_delta: i32,
    #[serde(default)]
    pub goals_delta: i32,
    #[serde(default)]
    pub assists_delta: i32,
    pub applied_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayerAdjustment {
    pub player_id: String,
    #[serde(default)]
    pub games_played_delta: i32,
    #[serde(default)]
    pub goals_delta: i32,
    #[serde(default)]
    pub assists_delta: i32,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentPatch {
    pub games_played_delta: Option<i32>,
    pub goals_delta: Option<i32>,
    pub assists_delta: Option<i32>,
    pub note: Option<String>,
}
