//! Polling long-running remote operations to a terminal state.
//!
//! A mutating remote call returns a [`LongRunningOperation`] handle right
//! away. The [`Waiter`] polls it until it succeeds, fails, or the operation's
//! time budget runs out. Every suspension point goes through the injected
//! [`Clock`] and honours the [`CancellationToken`], so tests drive the loop
//! on a [`FakeClock`](crate::testing::FakeClock) without real delays.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clock::{CancellationToken, Clock};
use crate::error::{ProviderError, Result};
use crate::retry::RetryPolicy;

const WAITING: &str = "waiting for remote operation";

/// Status reported by one poll of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running; the string is the remote's status text.
    InProgress(String),
    /// Finished successfully.
    Succeeded,
    /// Finished unsuccessfully; the string is the remote failure payload.
    Failed(String),
}

/// Handle to an in-flight remote operation.
#[async_trait]
pub trait LongRunningOperation: Send {
    /// Ask the remote API for the operation's current status.
    async fn poll(&mut self) -> Result<OperationStatus>;
}

/// An operation that was already complete when the remote call returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletedOperation;

#[async_trait]
impl LongRunningOperation for CompletedOperation {
    async fn poll(&mut self) -> Result<OperationStatus> {
        Ok(OperationStatus::Succeeded)
    }
}

/// Polling cadence for a [`Waiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterSettings {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Lower bound applied to `poll_interval`.
    pub min_poll_interval: Duration,
    /// Time to wait before the first poll.
    pub delay: Duration,
    /// Consecutive target observations required by [`Waiter::wait_for_state`].
    pub continuous_target_occurrence: u32,
    /// Not-found refreshes tolerated by [`Waiter::wait_for_state`].
    pub not_found_checks: u32,
}

impl WaiterSettings {
    /// The poll interval after applying the minimum.
    pub fn effective_interval(&self) -> Duration {
        self.poll_interval.max(self.min_poll_interval)
    }
}

impl Default for WaiterSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            min_poll_interval: Duration::from_secs(15),
            delay: Duration::ZERO,
            continuous_target_occurrence: 1,
            not_found_checks: 20,
        }
    }
}

/// How a successful wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalState {
    /// Number of polls issued, including the final one.
    pub polls: u32,
    /// Time between the start of the wait and the terminal poll.
    pub elapsed: Duration,
}

#[derive(Debug)]
enum WaitState {
    Sleeping(Duration),
    Polling,
    TimedOut,
}

/// Polls one operation to a terminal state within a fixed budget.
#[derive(Debug, Clone)]
pub struct Waiter {
    settings: WaiterSettings,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl Waiter {
    /// Create a waiter with a total budget of `timeout`.
    pub fn new(
        settings: WaiterSettings,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            settings,
            retry: RetryPolicy::default(),
            clock,
            cancel,
            timeout,
        }
    }

    /// Use `retry` for transient poll failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The total budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `op` until it reaches a terminal state.
    ///
    /// Fails with [`ProviderError::RemoteOperationFailed`] carrying the remote
    /// payload on terminal failure, [`ProviderError::Timeout`] with the last
    /// in-progress status once the budget is spent, and
    /// [`ProviderError::Cancelled`] as soon as the token fires. Throttled or
    /// transient poll errors are retried with backoff; others end the wait.
    pub async fn wait<O>(&self, op: &mut O) -> Result<TerminalState>
    where
        O: LongRunningOperation + ?Sized,
    {
        let started = self.clock.now();
        let deadline = started + self.timeout;
        let interval = self.settings.effective_interval();

        let mut polls = 0u32;
        let mut failed_polls = 0u32;
        let mut last_status = String::from("not polled yet");
        let mut state = if self.settings.delay.is_zero() {
            WaitState::Polling
        } else {
            WaitState::Sleeping(self.settings.delay)
        };

        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            state = match state {
                WaitState::TimedOut => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    warn!(?elapsed, polls, status = %last_status, "Timed out waiting for operation");
                    return Err(ProviderError::Timeout {
                        elapsed,
                        last_status,
                    });
                },
                _ if remaining.is_zero() => WaitState::TimedOut,
                WaitState::Sleeping(duration) => {
                    self.cancel
                        .sleep(self.clock.as_ref(), duration.min(remaining), WAITING)
                        .await?;
                    WaitState::Polling
                },
                WaitState::Polling => {
                    polls += 1;
                    // A poll that outlives the budget is abandoned.
                    let polled = self
                        .cancel
                        .run(WAITING, async {
                            tokio::select! {
                                biased;
                                result = op.poll() => Some(result),
                                _ = self.clock.sleep(remaining) => None,
                            }
                        })
                        .await?;

                    match polled {
                        None => WaitState::TimedOut,
                        Some(Ok(OperationStatus::Succeeded)) => {
                            let elapsed = self.clock.now().saturating_duration_since(started);
                            info!(?elapsed, polls, "Operation completed");
                            return Ok(TerminalState { polls, elapsed });
                        },
                        Some(Ok(OperationStatus::Failed(payload))) => {
                            warn!(polls, payload = %payload, "Operation failed");
                            return Err(ProviderError::RemoteOperationFailed(payload));
                        },
                        Some(Ok(OperationStatus::InProgress(status))) => {
                            debug!(poll = polls, status = %status, "Operation in progress");
                            last_status = status;
                            failed_polls = 0;
                            WaitState::Sleeping(interval)
                        },
                        Some(Err(err))
                            if err.is_retryable() && failed_polls + 1 < self.retry.max_attempts =>
                        {
                            let delay = self.retry.delay_for_attempt(failed_polls);
                            failed_polls += 1;
                            warn!(
                                poll = polls,
                                attempt = failed_polls,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Transient failure polling operation, retrying"
                            );
                            WaitState::Sleeping(delay)
                        },
                        Some(Err(err)) => return Err(err),
                    }
                },
            };
        }
    }

    /// Poll `refresh` until it reports one of the `target` statuses.
    ///
    /// `refresh` returns `None` when the resource is not found. Statuses in
    /// `pending` keep polling; a target status must be seen
    /// `continuous_target_occurrence` times in a row; any other status fails
    /// with [`ProviderError::RemoteOperationFailed`]. Not-found is tolerated
    /// for `not_found_checks` refreshes before failing with `NotFound`.
    pub async fn wait_for_state<F, Fut>(
        &self,
        pending: &[&str],
        target: &[&str],
        refresh: F,
    ) -> Result<TerminalState>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Option<String>>> + Send,
    {
        let mut op = StateRefresh {
            refresh,
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            required_occurrence: self.settings.continuous_target_occurrence.max(1),
            target_seen: 0,
            not_found_checks: self.settings.not_found_checks,
            not_found_seen: 0,
        };
        self.wait(&mut op).await
    }
}

struct StateRefresh<F> {
    refresh: F,
    pending: Vec<String>,
    target: Vec<String>,
    required_occurrence: u32,
    target_seen: u32,
    not_found_checks: u32,
    not_found_seen: u32,
}

#[async_trait]
impl<F, Fut> LongRunningOperation for StateRefresh<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Option<String>>> + Send,
{
    async fn poll(&mut self) -> Result<OperationStatus> {
        let status = match (self.refresh)().await? {
            Some(status) => status,
            None => {
                self.target_seen = 0;
                self.not_found_seen += 1;
                if self.not_found_seen > self.not_found_checks {
                    return Err(ProviderError::NotFound(format!(
                        "resource still missing after {} checks",
                        self.not_found_checks
                    )));
                }
                return Ok(OperationStatus::InProgress("NotFound".to_string()));
            },
        };
        self.not_found_seen = 0;

        if self.target.contains(&status) {
            self.target_seen += 1;
            if self.target_seen >= self.required_occurrence {
                return Ok(OperationStatus::Succeeded);
            }
            return Ok(OperationStatus::InProgress(status));
        }

        self.target_seen = 0;
        if self.pending.contains(&status) {
            Ok(OperationStatus::InProgress(status))
        } else {
            Ok(OperationStatus::Failed(format!(
                "unexpected state {:?}, wanted target {:?}",
                status, self.target
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeClock;

    fn waiter(clock: &FakeClock, timeout: Duration) -> Waiter {
        Waiter::new(
            WaiterSettings::default(),
            Arc::new(clock.clone()),
            CancellationToken::new(),
            timeout,
        )
    }

    struct Scripted(Vec<Result<OperationStatus>>);

    #[async_trait]
    impl LongRunningOperation for Scripted {
        async fn poll(&mut self) -> Result<OperationStatus> {
            if self.0.is_empty() {
                Ok(OperationStatus::InProgress("InProgress".to_string()))
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn test_interval_is_clamped() {
        let settings = WaiterSettings {
            poll_interval: Duration::from_secs(1),
            ..WaiterSettings::default()
        };
        assert_eq!(settings.effective_interval(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_completed_operation() {
        let clock = FakeClock::new();
        let done = waiter(&clock, Duration::from_secs(60))
            .wait(&mut CompletedOperation)
            .await
            .unwrap();
        assert_eq!(done.polls, 1);
        assert_eq!(done.elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_polls_until_success() {
        let clock = FakeClock::new();
        let mut op = Scripted(vec![
            Ok(OperationStatus::InProgress("Accepted".into())),
            Ok(OperationStatus::InProgress("Updating".into())),
            Ok(OperationStatus::Succeeded),
        ]);

        let done = waiter(&clock, Duration::from_secs(600))
            .wait(&mut op)
            .await
            .unwrap();
        assert_eq!(done.polls, 3);
        assert_eq!(done.elapsed, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_failure_payload_is_verbatim() {
        let clock = FakeClock::new();
        let payload = r#"{"code":"QuotaExceeded","message":"no cores left"}"#;
        let mut op = Scripted(vec![Ok(OperationStatus::Failed(payload.to_string()))]);

        let err = waiter(&clock, Duration::from_secs(600))
            .wait(&mut op)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteOperationFailed);
        assert_eq!(err.message(), payload);
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_retried() {
        let clock = FakeClock::new();
        let mut op = Scripted(vec![
            Err(ProviderError::Throttled("429".into())),
            Err(ProviderError::TransientNetwork("reset".into())),
            Ok(OperationStatus::Succeeded),
        ]);

        let done = waiter(&clock, Duration::from_secs(600))
            .wait(&mut op)
            .await
            .unwrap();
        assert_eq!(done.polls, 3);
        // 1s + 2s of retry backoff
        assert_eq!(done.elapsed, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_permanent_poll_error_ends_wait() {
        let clock = FakeClock::new();
        let mut op = Scripted(vec![Err(ProviderError::PermissionDenied("403".into()))]);

        let err = waiter(&clock, Duration::from_secs(600))
            .wait(&mut op)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_initial_delay() {
        let clock = FakeClock::new();
        let settings = WaiterSettings {
            delay: Duration::from_secs(10),
            ..WaiterSettings::default()
        };
        let done = Waiter::new(
            settings,
            Arc::new(clock.clone()),
            CancellationToken::new(),
            Duration::from_secs(60),
        )
        .wait(&mut CompletedOperation)
        .await
        .unwrap();
        assert_eq!(done.elapsed, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_wait_for_state_sequence() {
        let clock = FakeClock::new();
        let mut statuses = vec![None, Some("Creating"), Some("Creating"), Some("Succeeded")].into_iter();

        let done = waiter(&clock, Duration::from_secs(600))
            .wait_for_state(&["Creating"], &["Succeeded"], || {
                let next = statuses.next().flatten().map(str::to_string);
                async move { Ok::<_, ProviderError>(next) }
            })
            .await
            .unwrap();
        assert_eq!(done.polls, 4);
    }

    #[tokio::test]
    async fn test_wait_for_state_unexpected() {
        let clock = FakeClock::new();
        let err = waiter(&clock, Duration::from_secs(600))
            .wait_for_state(&["Creating"], &["Succeeded"], || async {
                Ok::<_, ProviderError>(Some("Failed".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteOperationFailed);
        assert!(err.message().contains("unexpected state \"Failed\""));
    }

    #[tokio::test]
    async fn test_wait_for_state_continuous_target() {
        let clock = FakeClock::new();
        let settings = WaiterSettings {
            continuous_target_occurrence: 2,
            ..WaiterSettings::default()
        };
        let mut statuses = vec!["Succeeded", "Updating", "Succeeded", "Succeeded"].into_iter();

        let done = Waiter::new(
            settings,
            Arc::new(clock.clone()),
            CancellationToken::new(),
            Duration::from_secs(600),
        )
        .wait_for_state(&["Updating"], &["Succeeded"], || {
            let next = statuses.next().map(str::to_string);
            async move { Ok::<_, ProviderError>(next) }
        })
        .await
        .unwrap();
        assert_eq!(done.polls, 4);
    }

    #[tokio::test]
    async fn test_wait_for_state_not_found_limit() {
        let clock = FakeClock::new();
        let settings = WaiterSettings {
            not_found_checks: 2,
            ..WaiterSettings::default()
        };
        let err = Waiter::new(
            settings,
            Arc::new(clock.clone()),
            CancellationToken::new(),
            Duration::from_secs(600),
        )
        .wait_for_state(&["Creating"], &["Succeeded"], || async { Ok::<_, ProviderError>(None) })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
