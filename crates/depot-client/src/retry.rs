//! Fixed-wait retry for chunk uploads.
//!
//! The writer prefers to stall indefinitely over silently dropping data:
//! a failed upload is logged as a warning and retried at the same offset
//! after a fixed wait, with no attempt cap and no backoff curve. Liveness
//! is pushed to the operator, who sees the warnings, rather than to the
//! data path.
//!
//! The policy deliberately does not distinguish retryable failures (503,
//! connection reset) from permanent ones (400, 401); a malformed request
//! therefore retries forever and is visible only in the logs.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::transport::UploadError;

/// Default wait between upload attempts.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(5);

/// Retry policy for the delivery loop: a fixed wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Time to sleep after a failed attempt.
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: DEFAULT_RETRY_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom wait interval.
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

/// Run `operation` until it succeeds.
///
/// Each failure is logged with the target URL and the failure description
/// (status code plus trailing response text for HTTP failures, the transport
/// message otherwise), then the policy's wait is slept before the next
/// attempt.
pub async fn until_delivered<F, Fut>(policy: &RetryPolicy, url: &str, mut operation: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), UploadError>>,
{
    let mut failures: usize = 0;

    loop {
        match operation().await {
            Ok(()) => {
                if failures > 0 {
                    debug!(url = %url, attempts = failures + 1, "upload succeeded after retry");
                }
                return;
            }
            Err(e) => {
                failures += 1;
                warn!(
                    url = %url,
                    error = %e,
                    attempt = failures,
                    "failed writing items, retrying"
                );
                sleep(policy.wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_policy_wait() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_immediate_success_is_one_attempt() {
        let policy = RetryPolicy::new(Duration::from_millis(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        until_delivered(&policy, "http://localhost/items", || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(Duration::from_millis(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        until_delivered(&policy, "http://localhost/items", || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                if count < 3 {
                    Err(UploadError::Status {
                        status: 503,
                        body: "over capacity".to_string(),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        // 3 failures + 1 success
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(30));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let start = tokio::time::Instant::now();
        until_delivered(&policy, "http://localhost/items", || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(UploadError::Transport("connection refused".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        // Two failures, so at least two full waits before success.
        assert!(
            start.elapsed() >= Duration::from_millis(55),
            "expected at least ~60ms of waiting, got {:?}",
            start.elapsed()
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
