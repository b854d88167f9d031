//! Bounded exponential-backoff retry for activity invocations.
//!
//! One shared [`RetryPolicy`] applies to all activity kinds unless overridden
//! per kind through [`RetryOptions`]. Only transient errors consume attempts;
//! anything else returns immediately to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::UpdateError;

/// Max attempts plus backoff shape for one activity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// A policy that never retries.
    pub const fn no_retry() -> Self {
        Self::new(1, 0, 0)
    }

    /// Backoff before retry number `attempt` (0-based): `base << attempt`,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let shifted = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(shifted.min(self.max_delay_ms))
    }
}

/// Shared retry configuration with optional per-activity-kind overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub default: RetryPolicy,
    pub rewrite: Option<RetryPolicy>,
    pub reconcile: Option<RetryPolicy>,
    pub cleanup: Option<RetryPolicy>,
}

impl RetryOptions {
    pub fn for_rewrite(&self) -> &RetryPolicy {
        self.rewrite.as_ref().unwrap_or(&self.default)
    }

    pub fn for_reconcile(&self) -> &RetryPolicy {
        self.reconcile.as_ref().unwrap_or(&self.default)
    }

    pub fn for_cleanup(&self) -> &RetryPolicy {
        self.cleanup.as_ref().unwrap_or(&self.default)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the policy.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, tag: &str, op: F) -> Result<T, UpdateError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, UpdateError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let backoff = policy.delay_for(attempt);
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "{tag} failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(attempt, error = %err, "{tag} exhausted retries");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn per_kind_override_falls_back_to_default() {
        let options = RetryOptions {
            default: RetryPolicy::new(5, 10, 100),
            cleanup: Some(RetryPolicy::new(2, 1, 1)),
            ..Default::default()
        };
        assert_eq!(options.for_rewrite(), &options.default);
        assert_eq!(options.for_reconcile(), &options.default);
        assert_eq!(options.for_cleanup().max_attempts, 2);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(10, 10, 50);
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(50));
        assert_eq!(policy.delay_for(63), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 1, 1);
        let out = with_retry(&policy, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(UpdateError::TransientStore("flaky".into()))
            } else {
                Ok(7u32)
            }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, 1, 1);
        let out: Result<(), _> = with_retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(UpdateError::StaleIndex("s/se/i".into()))
        })
        .await;
        assert_eq!(out, Err(UpdateError::StaleIndex("s/se/i".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, 1, 1);
        let out: Result<(), _> = with_retry(&policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(UpdateError::TransientStore("down".into()))
        })
        .await;
        assert_eq!(out, Err(UpdateError::TransientStore("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
