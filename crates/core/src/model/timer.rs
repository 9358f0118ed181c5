//! Ephemeral game timer state. Local-only: never enqueued, never synced.

use serde::{Deserialize, Serialize};

/// The KV key holding the timer state. Key and shape are contractual;
/// changing either loses in-progress timers on upgrade.
pub const TIMER_STATE_KEY: &str = "soccerTimerState";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub game_id: String,
    pub time_elapsed_in_seconds: i64,
    /// Wall-clock millis at the moment the state was captured.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_running: Option<bool>,
}
