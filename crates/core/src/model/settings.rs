//! Per-user application settings singleton.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_game_id: Option<String>,
    #[serde(default)]
    pub last_home_team_name: String,
    #[serde(default)]
    pub has_seen_app_guide: bool,
    #[serde(default)]
    pub use_demand_correction: bool,
    #[serde(default)]
    pub has_configured_season_dates: bool,
    /// `MM-DD` season window start; `None` means the built-in default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_season_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_season_end: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            current_game_id: None,
            last_home_team_name: String::new(),
            has_seen_app_guide: false,
            use_demand_correction: false,
            has_configured_season_dates: false,
            club_season_start: None,
            club_season_end: None,
        }
    }
}

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub language: Option<String>,
    pub current_game_id: Option<String>,
    pub last_home_team_name: Option<String>,
    pub has_seen_app_guide: Option<bool>,
    pub use_demand_correction: Option<bool>,
    pub has_configured_season_dates: Option<bool>,
    pub club_season_start: Option<String>,
    pub club_season_end: Option<String>,
}

impl AppSettings {
    pub fn apply_patch(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.language {
            self.language = v;
        }
        if let Some(v) = patch.current_game_id {
            self.current_game_id = Some(v);
        }
        if let Some(v) = patch.last_home_team_name {
            self.last_home_team_name = v;
        }
        if let Some(v) = patch.has_seen_app_guide {
            self.has_seen_app_guide = v;
        }
        if let Some(v) = patch.use_demand_correction {
            self.use_demand_correction = v;
        }
        if let Some(v) = patch.has_configured_season_dates {
            self.has_configured_season_dates = v;
        }
        if let Some(v) = patch.club_season_start {
            self.club_season_start = Some(v);
        }
        if let Some(v) = patch.club_season_end {
            self.club_season_end = Some(v);
        }
    }
}
