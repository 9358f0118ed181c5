//! Warmup plan: a per-user singleton document.

use serde::{Deserialize, Serialize};

/// Fixed id of the per-user warmup plan singleton.
pub const WARMUP_PLAN_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupSection {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub activities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupPlan {
    pub id: String,
    pub version: i64,
    pub last_modified: String,
    /// Forced to `false` on every save; a stored plan is by definition a
    /// user customization.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub sections: Vec<WarmupSection>,
    pub created_at: String,
    pub updated_at: String,
}
