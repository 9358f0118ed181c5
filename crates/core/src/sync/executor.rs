//! The injectable executor the sync engine drains the queue through.

use async_trait::async_trait;

use crate::errors::{Result, RetryClass, StoreError};
use crate::sync::SyncQueueEntry;

/// What happened when an entry was applied remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncApplyOutcome {
    Applied,
    /// The operation was a remote no-op (e.g. delete of an absent row);
    /// the engine drops the entry and logs the reason.
    Skipped(String),
}

/// Maps one queue entry to the corresponding remote call.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn apply(&self, entry: &SyncQueueEntry) -> Result<SyncApplyOutcome>;
}

/// Engine-side handling of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDisposition {
    /// Transient; reschedule with backoff.
    Retry,
    /// Non-transient; remove the entry, move the engine to `Error`, and
    /// emit the details.
    Surface,
}

pub fn disposition_for(err: &StoreError) -> SyncDisposition {
    match err.retry_class() {
        RetryClass::Retryable => SyncDisposition::Retry,
        RetryClass::Permanent | RetryClass::ReauthRequired => SyncDisposition::Surface,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry_the_rest_surface() {
        assert_eq!(
            disposition_for(&StoreError::Network("offline".into())),
            SyncDisposition::Retry
        );
        assert_eq!(
            disposition_for(&StoreError::Backend("500".into())),
            SyncDisposition::Retry
        );
        assert_eq!(
            disposition_for(&StoreError::Validation("bad name".into())),
            SyncDisposition::Surface
        );
        assert_eq!(
            disposition_for(&StoreError::already_exists("team", "Eagles")),
            SyncDisposition::Surface
        );
        assert_eq!(
            disposition_for(&StoreError::conflict("game_1", None)),
            SyncDisposition::Surface
        );
        assert_eq!(
            disposition_for(&StoreError::Auth("revoked".into())),
            SyncDisposition::Surface
        );
    }
}
