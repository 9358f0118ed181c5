//! Transient-error retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use log::debug;
use matchops_core::{Result, StoreError};
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Per-operation retry budget (attempts, not retries).
pub const MAX_ATTEMPTS: usize = 3;
const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

fn backoff_with_jitter(attempt: usize) -> Duration {
    let exp = (attempt.saturating_sub(1) as u32).min(8);
    let backoff = (BASE_BACKOFF_MS.saturating_mul(1_u64 << exp)).min(MAX_BACKOFF_MS);
    let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
    Duration::from_millis(backoff.saturating_add(jitter))
}

/// Run `op` up to [`MAX_ATTEMPTS`] times, retrying only classified transient
/// failures. Rate-limit hints override the computed backoff. The token
/// aborts both in-flight attempts and backoff waits.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    op_name: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StoreError::Network(format!("{op_name} cancelled")));
            }
            result = op() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let backoff = match &err {
                    StoreError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => backoff_with_jitter(attempt),
                };
                debug!(
                    "{op_name} retry attempt {}/{} after transient error: {err}",
                    attempt + 1,
                    MAX_ATTEMPTS
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(StoreError::Network(format!("{op_name} cancelled")));
                    }
                    _ = sleep(backoff) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let cancel = CancellationToken::new();

        let result = with_retry(&cancel, "test-op", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Network("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let cancel = CancellationToken::new();

        let result: Result<()> = with_retry(&cancel, "test-op", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Validation("bad".into()))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "VALIDATION");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_budget_and_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let cancel = CancellationToken::new();

        let result: Result<()> = with_retry(&cancel, "test-op", move || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Network("down".into()))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), "NETWORK");
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn cancellation_aborts_before_next_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> =
            with_retry(&cancel, "test-op", || async { Ok(()) }).await;
        assert_eq!(result.unwrap_err().code(), "NETWORK");
    }
}
