use super::errors::{AttemptError, StoreError};
use crate::config::RetryPolicy;
use std::future::Future;

/// Runs `attempt` until it succeeds, fails permanently or the policy runs out of attempts.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Permanent(error)) => {
                tracing::debug!(operation, attempts, %error, "Permanent state store failure.");
                return Err(error);
            }
            Err(AttemptError::Transient(reason)) => {
                if attempts >= max_attempts {
                    tracing::warn!(operation, attempts, %reason, "Giving up on state store.");

                    return Err(StoreError::Unavailable {
                        operation,
                        attempts,
                        reason,
                    });
                }

                let backoff = policy.backoff_after(attempts);
                tracing::warn!(
                    operation,
                    attempts,
                    max_attempts,
                    ?backoff,
                    %reason,
                    "Transient state store failure. Retrying."
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy(), "fetch", || async {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < 3 {
                Err(AttemptError::Transient(String::from("timeout")))
            } else {
                Ok(call)
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_unavailable() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let error = with_retry(&policy(), "fetch", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AttemptError::Transient(String::from("connection refused")))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            error,
            StoreError::Unavailable {
                operation: "fetch",
                attempts: 3,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);

        let error = with_retry(&policy(), "upsert", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(AttemptError::Permanent(StoreError::Unauthorized))
        })
        .await
        .unwrap_err();

        assert!(matches!(error, StoreError::Unauthorized));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
