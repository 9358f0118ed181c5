//! Stable KV key names, one per logical collection.

pub const KEY_SAVED_GAMES: &str = "savedGames";
pub const KEY_MASTER_ROSTER: &str = "masterRoster";
pub const KEY_TEAMS: &str = "teams";
pub const KEY_TEAM_ROSTERS: &str = "teamRosters";
pub const KEY_SEASONS: &str = "seasons";
pub const KEY_TOURNAMENTS: &str = "tournaments";
pub const KEY_PERSONNEL: &str = "personnel";
pub const KEY_PLAYER_ADJUSTMENTS: &str = "playerAdjustments";
pub const KEY_WARMUP_PLAN: &str = "warmupPlan";
pub const KEY_APP_SETTINGS: &str = "appSettings";
pub const KEY_SYNC_QUEUE: &str = "syncQueue";
/// Per-user backend-mode preference.
pub const KEY_BACKEND_MODE_PREF: &str = "matchops_backend_mode";
