//! Retry with exponential backoff for transient HTTP failures.
//!
//! Transient-vs-fatal classification lives here and nowhere else: network
//! errors, timeouts, 429, 503, and other 5xx responses are retried; 4xx
//! responses (except 429), parse failures, and store errors propagate
//! immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::ScrapeError;

/// Returns `true` if `err` represents a transient condition worth retrying
/// after a backoff delay.
fn is_retriable(err: &ScrapeError) -> bool {
    match err {
        ScrapeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        ScrapeError::RateLimited { .. } => true,
        ScrapeError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First backoff delay; doubles on each retry.
    pub base_delay_secs: u64,
    /// Upper bound for any single delay.
    pub cap_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2,
            cap_delay_secs: 10,
        }
    }
}

impl RetryPolicy {
    fn delay_for(self, retry_index: u32) -> Duration {
        let exp = self
            .base_delay_secs
            .saturating_mul(1_u64 << retry_index.min(62));
        Duration::from_secs(exp.min(self.cap_delay_secs))
    }
}

/// Executes `operation`, retrying transient errors with exponential backoff
/// (2 s → 4 s → 8 s under the default policy, capped at 10 s). The last
/// error is returned once attempts are exhausted; non-retriable errors are
/// returned immediately without sleeping.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ScrapeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let mut retry_index = 0_u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let attempts_made = retry_index + 1;
                if !is_retriable(&err) || attempts_made >= policy.max_attempts {
                    return Err(err);
                }

                let delay = policy.delay_for(retry_index);
                tracing::warn!(
                    attempt = attempts_made,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient fetch error, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                retry_index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rate_limited() -> ScrapeError {
        ScrapeError::RateLimited {
            url: "https://example.cz/list".to_string(),
            retry_after_secs: 0,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 0,
            cap_delay_secs: 0,
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ScrapeError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limited_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(rate_limited())
                } else {
                    Ok::<u32, ScrapeError>(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(rate_limited())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ScrapeError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::UnexpectedStatus {
                    status: 503,
                    url: "https://example.cz".to_string(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::UnexpectedStatus {
                    status: 403,
                    url: "https://example.cz".to_string(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn parse_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ScrapeError>(ScrapeError::Parse {
                    url: "https://example.cz/detail/1".to_string(),
                    reason: "missing title".to_string(),
                })
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScrapeError::Parse { .. })));
    }

    #[test]
    fn delays_follow_doubling_with_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    }
}
