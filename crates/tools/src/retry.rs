//! Retry with exponential backoff for search calls.
//!
//! Only transient failure classes are retried; everything else surfaces on
//! the first attempt.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use touchline_core::error::SearchError;
use tracing::{debug, warn};

/// Backoff schedule for one logical search.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    ///
    /// Doubles each time, capped at `max_delay`. A server-provided
    /// retry-after hint wins when it is longer.
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        match retry_after_secs {
            Some(secs) => backoff.max(Duration::from_secs(secs).min(self.max_delay)),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(8))
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// Returns the value and the number of attempts made.
pub async fn retry_async<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<(T, u32), SearchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Search succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(error) if !error.is_transient() => {
                debug!(kind = %error.kind, "Non-retryable search error");
                return Err(error);
            }
            Err(error) if attempt >= policy.max_attempts => {
                warn!(attempts = attempt, error = %error, "Search retries exhausted");
                return Err(error);
            }
            Err(error) => {
                let delay = policy.delay_for(attempt, error.retry_after_secs);
                warn!(attempt, error = %error, ?delay, "Search attempt failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use touchline_core::error::SearchErrorKind;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(2));
    }

    #[test]
    fn retry_after_extends_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(8));
        assert_eq!(policy.delay_for(1, Some(3)), Duration::from_secs(3));
        assert_eq!(policy.delay_for(1, Some(60)), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let (value, attempts) = retry_async(&RetryPolicy::default(), |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SearchError::new(SearchErrorKind::Upstream5xx, "503"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_surface_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = retry_async(&RetryPolicy::default(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SearchError::new(SearchErrorKind::Authentication, "bad key"))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, SearchErrorKind::Authentication);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = retry_async(&RetryPolicy::default(), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SearchError::new(SearchErrorKind::Timeout, "timed out"))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind, SearchErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
