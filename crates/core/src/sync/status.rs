//! Sync engine status model and backoff policy.

use serde::{Deserialize, Serialize};

/// Engine lifecycle states. Every state may transition to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncEngineState {
    Idle,
    Syncing,
    Paused,
    Stopped,
    Error,
}

/// Snapshot emitted on every engine transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncEngineState,
    pub pending_count: usize,
    pub failed_count: usize,
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncEngineState::Stopped,
            pending_count: 0,
            failed_count: 0,
            last_synced_at: None,
            last_error: None,
        }
    }
}

/// Per-entry attempt cap; exceeding it drops the entry with a surfaced
/// failure event.
pub const MAX_ENTRY_ATTEMPTS: u32 = 8;

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(attempts: u32) -> u64 {
    const MAX_EXPONENT: u32 = 8;
    const BASE_DELAY_SECONDS: u64 = 5;

    2_u64.pow(attempts.min(MAX_EXPONENT)) * BASE_DELAY_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_seconds(0), 5);
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(2), 20);
        assert_eq!(backoff_seconds(9), backoff_seconds(8));
    }

    #[test]
    fn state_serialization() {
        assert_eq!(
            serde_json::to_string(&SyncEngineState::Paused).unwrap(),
            "\"paused\""
        );
    }
}
