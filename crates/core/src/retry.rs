//! Shared bounded-retry helper for contention errors.
//!
//! `original_source` reimplements the same while-loop/backoff/rollback
//! pattern in every `data_structures/kb_*.py` file (`peak_job_data`,
//! `push_rpc_queue`, `peak_reply_data`, ...). This crate extracts it once so
//! every satellite crate shares one retry policy shape and one
//! `RetryExhausted` error.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::KbError;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay before every retry (job queue, stream, RPC-client inbox).
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `cap` (RPC-server push/peek, per
    /// `spec.md` §4.5's "exponential backoff, cap ≈ 8s").
    Exponential { base: Duration, cap: Duration },
}

/// Bounded retry budget for one operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, cap },
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, cap } => {
                let scaled = base.saturating_mul(1u32 << attempt.min(16));
                scaled.min(cap)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(250))
    }
}

/// Run `op` until it succeeds, returns a non-contention error, or the retry
/// budget in `policy` is spent — in which case the last contention error is
/// wrapped in [`KbError::RetryExhausted`].
pub async fn with_backoff<F, Fut, T>(policy: &RetryPolicy, mut op: F) -> Result<T, KbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KbError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_contention() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(KbError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, "retrying after contention error: {err}");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let result = with_backoff(&policy, || async { Ok::<_, KbError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn non_contention_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(1));
        let result = with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(KbError::QueueFull) }
        })
        .await;
        assert!(matches!(result, Err(KbError::QueueFull)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_millis(500), Duration::from_secs(8));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }
}
