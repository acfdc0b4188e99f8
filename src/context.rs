//! Per-invocation dependencies for lifecycle controllers.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{CancellationToken, Clock, TokioClock};
use crate::config::{ProviderConfig, TimeoutOverrides, MIN_POLL_INTERVAL_SECS};
use crate::descriptor::{Operation, ResourceTimeouts};
use crate::error::{ProviderError, Result};
use crate::retry::RetryPolicy;
use crate::waiter::{Waiter, WaiterSettings};

/// Everything one lifecycle operation needs besides its remote client.
///
/// Built fresh for each invocation and passed down explicitly; there is no
/// shared global client registry.
#[derive(Debug, Clone)]
pub struct OperationContext {
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    waiter: WaiterSettings,
    retry: RetryPolicy,
    subscription_id: Option<String>,
    timeouts: TimeoutOverrides,
}

impl OperationContext {
    /// A context with wall-clock time and default settings.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(TokioClock),
            cancel: CancellationToken::new(),
            waiter: WaiterSettings::default(),
            retry: RetryPolicy::default(),
            subscription_id: None,
            timeouts: TimeoutOverrides::default(),
        }
    }

    /// A context carrying the provider's configuration.
    pub fn from_config(
        config: &ProviderConfig,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            clock,
            cancel,
            waiter: WaiterSettings {
                poll_interval: Duration::from_secs(config.poll_interval_secs),
                min_poll_interval: Duration::from_secs(
                    config.min_poll_interval_secs.max(MIN_POLL_INTERVAL_SECS),
                ),
                ..WaiterSettings::default()
            },
            retry: RetryPolicy::from(&config.retry),
            subscription_id: config.subscription_id.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the waiter settings.
    pub fn with_waiter_settings(mut self, settings: WaiterSettings) -> Self {
        self.waiter = settings;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the subscription used to build IDs for new resources.
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    /// Override per-operation timeouts.
    pub fn with_timeouts(mut self, timeouts: TimeoutOverrides) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The injected clock.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// The cancellation token for this invocation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Polling cadence used by [`OperationContext::waiter`].
    pub fn waiter_settings(&self) -> &WaiterSettings {
        &self.waiter
    }

    /// Retry policy for idempotent calls.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The configured subscription, or a `Configuration` error.
    pub fn subscription_id(&self) -> Result<&str> {
        self.subscription_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration(
                "no subscription configured for new resources".to_string(),
            )
        })
    }

    /// The budget for `operation`, after applying overrides to `base`.
    pub fn timeout_for(&self, base: ResourceTimeouts, operation: Operation) -> Duration {
        self.timeouts.apply(base).for_operation(operation)
    }

    /// A waiter bounded by `timeout`, sharing this context's clock,
    /// cancellation and retry policy.
    pub fn waiter(&self, timeout: Duration) -> Waiter {
        Waiter::new(self.waiter, self.clock.clone(), self.cancel.clone(), timeout)
            .with_retry(self.retry)
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
