//! Retry with exponential backoff for single remote requests

use std::future::Future;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::SourceError;

/// Run `op` until it succeeds, fails non-retriably, or attempts run out
///
/// Returns the last result together with the number of attempts made.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> (Result<T, SourceError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if e.is_retriable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    what, attempt, max_attempts, delay, e
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn unavailable() -> SourceError {
        SourceError::Unavailable {
            message: "HTTP 503".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, attempts) = with_retry(&RetryPolicy::immediate(3), "fetch", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, attempts) = with_retry(&RetryPolicy::immediate(3), "fetch", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(unavailable())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let (result, attempts) = with_retry(&RetryPolicy::immediate(3), "fetch", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(SourceError::NotFound { id: "X".into() })
        })
        .await;

        assert!(matches!(result, Err(SourceError::NotFound { .. })));
        assert_eq!(attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2,
            max_delay_ms: 8000,
        };
        let start = tokio::time::Instant::now();
        let (result, _) = with_retry(&policy, "fetch", || async { Err::<(), _>(unavailable()) }).await;

        assert!(result.is_err());
        // 1s after the first failure, 2s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
