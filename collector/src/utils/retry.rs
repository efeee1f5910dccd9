//! Async retry with exponential backoff

use std::time::Duration;

/// Upper bound on a single backoff sleep
pub const MAX_BACKOFF_DELAY_MS: u64 = 30_000;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(
        base_delay_ms
            .saturating_mul(factor)
            .min(MAX_BACKOFF_DELAY_MS),
    )
}

/// Retry an async operation with exponential backoff.
///
/// Returns `Ok(attempts)` on success, or `Err((error, attempts))` once
/// `max_attempts` tries have failed.
pub async fn retry_with_backoff_async<F, Fut, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<u32, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(()) => return Ok(attempts),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err((e, attempts));
                }
                let delay = backoff_delay(base_delay_ms, attempts);
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_on_first_try() {
        let result = retry_with_backoff_async(3, 10, || async { Ok::<(), &str>(()) }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff_async(3, 10, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err("transient error")
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn test_failure_after_max_retries() {
        let result =
            retry_with_backoff_async(3, 10, || async { Err::<(), _>("persistent error") }).await;
        let (error, attempts) = result.unwrap_err();
        assert_eq!(error, "persistent error");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff_async(0, 10, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("down") }
        })
        .await;
        assert_eq!(result, Err(("down", 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 3), Duration::from_millis(400));
        assert_eq!(
            backoff_delay(100, 64),
            Duration::from_millis(MAX_BACKOFF_DELAY_MS)
        );
    }
}
