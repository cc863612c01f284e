use crate::common::config::RetryConfig;
use crate::common::Result;
use std::time::Duration;

/// Run a store operation, retrying transient failures with exponential backoff.
///
/// Only `StorageUnavailable` is retried; every other error is returned on the
/// first attempt.
pub async fn with_retry<T, F>(policy: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = Duration::from_millis(policy.initial_backoff_ms);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    op_name, attempt, policy.max_attempts, e, backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::VisiRideError;

    fn policy() -> RetryConfig {
        RetryConfig { max_attempts: 3, initial_backoff_ms: 1 }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let mut calls = 0;
        let value = with_retry(&policy(), "test", || {
            calls += 1;
            if calls < 3 {
                Err(VisiRideError::StorageUnavailable("busy".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&policy(), "test", || {
            calls += 1;
            Err(VisiRideError::StorageUnavailable("busy".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let mut calls = 0;
        let result: Result<()> = with_retry(&policy(), "test", || {
            calls += 1;
            Err(VisiRideError::Storage("corrupt".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
