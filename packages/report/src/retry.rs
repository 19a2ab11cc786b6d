//! Exponential-backoff retry for remote API calls.
//!
//! The `n`-th retry waits `base_delay * 2^(n-1)`. Backoff sleeps race the
//! run's cancellation token, and a cancelled call is never retried.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ApiError;

/// Retry ceiling and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable`
/// rejects, or the retry ceiling is reached.
///
/// `on_retry` is called with the retry number and delay before each
/// backoff sleep.
///
/// # Errors
///
/// Returns the last [`ApiError`], or [`ApiError::Cancelled`] as soon as
/// `cancel` fires.
pub async fn with_backoff<T, F, Fut, R, N>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: R,
    mut on_retry: N,
    mut op: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    R: Fn(&ApiError) -> bool,
    N: FnMut(u32, Duration),
{
    let mut retry = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if error.is_cancelled() || cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if !is_retryable(&error) || retry >= policy.max_retries {
            return Err(error);
        }

        retry += 1;
        let delay = policy.delay_for(retry);
        log::warn!(
            "  retry {retry}/{} in {delay:?}: {error}",
            policy.max_retries
        );
        on_retry(retry, delay);

        tokio::select! {
            () = cancel.cancelled() => return Err(ApiError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    const NO_DELAY: RetryPolicy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::ZERO,
    };

    fn transient() -> ApiError {
        ApiError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn stops_at_the_retry_ceiling() {
        let attempts = Cell::new(0u32);
        let retries = Cell::new(0u32);
        let result: Result<(), ApiError> = with_backoff(
            &NO_DELAY,
            &CancellationToken::new(),
            |_| true,
            |_, _| retries.set(retries.get() + 1),
            || {
                attempts.set(attempts.get() + 1);
                async { Err(transient()) }
            },
        )
        .await;
        assert!(matches!(result, Err(ApiError::Status { status: 503, .. })));
        assert_eq!(attempts.get(), 3);
        assert_eq!(retries.get(), 2);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = Cell::new(0u32);
        let result = with_backoff(
            &NO_DELAY,
            &CancellationToken::new(),
            |_| true,
            |_, _| {},
            || {
                attempts.set(attempts.get() + 1);
                let n = attempts.get();
                async move { if n < 2 { Err(transient()) } else { Ok(n) } }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let attempts = Cell::new(0u32);
        let result: Result<(), ApiError> = with_backoff(
            &NO_DELAY,
            &CancellationToken::new(),
            |_| false,
            |_, _| {},
            || {
                attempts.set(attempts.get() + 1);
                async { Err(transient()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_retries() {
        let cancel = CancellationToken::new();
        let attempts = Cell::new(0u32);
        let result: Result<(), ApiError> = with_backoff(
            &NO_DELAY,
            &cancel,
            |_| true,
            |_, _| {},
            || {
                attempts.set(attempts.get() + 1);
                cancel.cancel();
                async { Err(transient()) }
            },
        )
        .await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(attempts.get(), 1);
    }
}
