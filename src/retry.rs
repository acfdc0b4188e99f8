//! Bounded exponential backoff for idempotent remote calls.
//!
//! Only reads and operation polls go through [`retry_idempotent`]. Create,
//! update and delete submissions are never retried: a timed-out submission
//! may still have taken effect remotely.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::clock::{CancellationToken, Clock};
use crate::config::RetrySettings;
use crate::error::Result;

/// How often and how patiently to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay.max(0.0))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
///
/// Retries happen only for errors where
/// [`ProviderError::is_retryable`](crate::error::ProviderError::is_retryable)
/// holds. Backoff sleeps go through `clock` and end early on cancellation.
pub async fn retry_idempotent<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    cancel: &CancellationToken,
    what: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match cancel.run(what, call()).await? {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = what,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                cancel.sleep(clock, delay, what).await?;
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ProviderError};
    use crate::testing::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let policy = fast_policy(5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        // capped at max
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_secs(10));
    }

    #[test]
    fn test_from_settings() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 0,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
            multiplier: 1.5,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let clock = FakeClock::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = retry_idempotent(
            &fast_policy(5),
            &clock,
            &CancellationToken::new(),
            "get registry",
            move || async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(ProviderError::Throttled("429".into())),
                    1 => Err(ProviderError::TransientNetwork("connection reset".into())),
                    _ => Ok("ok"),
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff on the fake clock
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let clock = FakeClock::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = retry_idempotent(
            &fast_policy(3),
            &clock,
            &CancellationToken::new(),
            "get registry",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::Throttled("429".into()))
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let clock = FakeClock::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = retry_idempotent(
            &fast_policy(5),
            &clock,
            &CancellationToken::new(),
            "get registry",
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ProviderError::Conflict("busy".into()))
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = retry_idempotent(&fast_policy(5), &FakeClock::new(), &cancel, "get", || async {
            Ok::<_, ProviderError>(1)
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
