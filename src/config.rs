//! Provider-wide configuration.
//!
//! The host passes a JSON object to `configure`. Missing keys take the
//! defaults below; `HEMMER_SUBSCRIPTION_ID` and `HEMMER_POLL_INTERVAL_SECS`
//! then override what the JSON said.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::ResourceTimeouts;
use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::validators;

/// Environment variable overriding [`ProviderConfig::subscription_id`].
pub const ENV_SUBSCRIPTION_ID: &str = "HEMMER_SUBSCRIPTION_ID";

/// Environment variable overriding [`ProviderConfig::poll_interval_secs`].
pub const ENV_POLL_INTERVAL_SECS: &str = "HEMMER_POLL_INTERVAL_SECS";

/// Smallest accepted `min_poll_interval_secs`. Polls never run closer together.
pub const MIN_POLL_INTERVAL_SECS: u64 = 15;

const MAX_INTERVAL_SECS: i64 = 86_400;

/// Backoff settings for idempotent calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff growth factor.
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Per-operation timeout overrides, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutOverrides {
    /// Overrides the create timeout.
    pub create_secs: Option<u64>,
    /// Overrides the read timeout.
    pub read_secs: Option<u64>,
    /// Overrides the update timeout.
    pub update_secs: Option<u64>,
    /// Overrides the delete timeout.
    pub delete_secs: Option<u64>,
}

impl TimeoutOverrides {
    /// Apply the overrides on top of a resource's own timeouts.
    pub fn apply(&self, base: ResourceTimeouts) -> ResourceTimeouts {
        let pick = |over: Option<u64>, default: Duration| {
            over.map(Duration::from_secs).unwrap_or(default)
        };
        ResourceTimeouts {
            create: pick(self.create_secs, base.create),
            read: pick(self.read_secs, base.read),
            update: pick(self.update_secs, base.update),
            delete: pick(self.delete_secs, base.delete),
        }
    }
}

/// Configuration accepted by `configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Subscription new resources are created in.
    pub subscription_id: Option<String>,
    /// Seconds between long-running operation polls.
    pub poll_interval_secs: u64,
    /// Lower bound applied to `poll_interval_secs`; at least
    /// [`MIN_POLL_INTERVAL_SECS`].
    pub min_poll_interval_secs: u64,
    /// Retry behaviour for reads and polls.
    pub retry: RetrySettings,
    /// Per-operation timeout overrides.
    pub timeouts: TimeoutOverrides,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            subscription_id: None,
            poll_interval_secs: MIN_POLL_INTERVAL_SECS,
            min_poll_interval_secs: MIN_POLL_INTERVAL_SECS,
            retry: RetrySettings::default(),
            timeouts: TimeoutOverrides::default(),
        }
    }
}

impl ProviderConfig {
    /// Schema describing the `configure` payload.
    pub fn schema() -> Schema {
        let seconds = |min: u64| {
            Attribute::optional_int64()
                .with_validator(validators::int_between(min as i64, MAX_INTERVAL_SECS))
        };
        Schema::v0()
            .with_attribute(
                "subscription_id",
                Attribute::optional_string()
                    .with_description("Subscription ID; falls back to HEMMER_SUBSCRIPTION_ID")
                    .with_validator(validators::non_empty_string()),
            )
            .with_attribute("poll_interval_secs", seconds(0))
            .with_attribute("min_poll_interval_secs", seconds(MIN_POLL_INTERVAL_SECS))
            .with_attribute(
                "retry",
                Attribute::new(AttributeType::Dynamic, AttributeFlags::optional()).with_description(
                    "Backoff for reads and polls: max_attempts, initial_delay_ms, max_delay_ms, multiplier",
                ),
            )
            .with_attribute(
                "timeouts",
                Attribute::new(AttributeType::Dynamic, AttributeFlags::optional()).with_description(
                    "Per-operation timeout overrides: create_secs, read_secs, update_secs, delete_secs",
                ),
            )
    }

    /// Parse configuration from JSON, then apply environment overrides.
    pub fn from_value_and_env(value: &Value) -> Result<Self> {
        Self::from_value_with_env(value, |key| std::env::var(key).ok())
    }

    /// Like [`ProviderConfig::from_value_and_env`] with an explicit lookup.
    pub fn from_value_with_env<F>(value: &Value, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = match value {
            Value::Null => Self::default(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        if let Some(subscription) = lookup(ENV_SUBSCRIPTION_ID).filter(|s| !s.is_empty()) {
            config.subscription_id = Some(subscription);
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_SECS) {
            config.poll_interval_secs = raw.trim().parse().map_err(|_| {
                ProviderError::Configuration(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    ENV_POLL_INTERVAL_SECS, raw
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.subscription_id, Some(s) if s.trim().is_empty()) {
            return Err(ProviderError::Configuration(
                "subscription_id must not be empty".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 || !self.retry.multiplier.is_finite() {
            return Err(ProviderError::Configuration(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ProviderError::Configuration(format!(
                "retry.max_delay_ms ({}) is less than retry.initial_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.initial_delay_ms
            )));
        }
        if self.min_poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            return Err(ProviderError::Configuration(format!(
                "min_poll_interval_secs must be at least {}, got {}",
                MIN_POLL_INTERVAL_SECS, self.min_poll_interval_secs
            )));
        }
        Ok(())
    }

    /// Poll interval after applying the minimum.
    pub fn effective_poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .max(self.min_poll_interval_secs)
                .max(MIN_POLL_INTERVAL_SECS),
        )
    }

    /// The configured subscription, or `Configuration` if none was given.
    pub fn require_subscription(&self) -> Result<&str> {
        self.subscription_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration(format!(
                "subscription_id is not set; configure it or export {}",
                ENV_SUBSCRIPTION_ID
            ))
        })
    }
}
