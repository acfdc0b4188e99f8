//! Error types for the reconciliation engine.
//!
//! Every remote or validation failure propagates to the caller as a
//! [`ProviderError`]. Lifecycle operations attach the identity of the resource
//! they were working on via [`ProviderError::Resource`], so a failure reads as
//! `container registry "acr1" (resource group "rg1"): Conflict: ...`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::Diagnostic;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Identity of the resource an error relates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContext {
    /// Human-readable resource kind, e.g. `container registry`.
    pub resource_type: String,
    /// The resource's own name (last ID segment).
    pub name: String,
    /// Resource group, when the resource lives in one.
    pub resource_group: Option<String>,
}

impl ResourceContext {
    /// Create a context for a resource that lives in a resource group.
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            resource_group: Some(resource_group.into()),
        }
    }

    /// Context for a resource that has no ID yet, read from the `name` and
    /// `resource_group_name` keys of its configuration.
    pub fn from_config(resource_type: impl Into<String>, config: &serde_json::Value) -> Self {
        let field = |key: &str| config.get(key).and_then(serde_json::Value::as_str).map(str::to_string);
        Self {
            resource_type: resource_type.into(),
            name: field("name").unwrap_or_default(),
            resource_group: field("resource_group_name"),
        }
    }
}

impl fmt::Display for ResourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.resource_type, self.name)?;
        if let Some(group) = &self.resource_group {
            write!(f, " (resource group {:?})", group)?;
        }
        Ok(())
    }
}

/// Coarse classification of a [`ProviderError`].
///
/// Variants mirror the [`ProviderError`] variants of the same name.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedId,
    AlreadyExists,
    NotFound,
    RemoteRejected,
    Conflict,
    Throttled,
    TransientNetwork,
    RemoteOperationFailed,
    Timeout,
    Cancelled,
    RequiresReplacement,
    Validation,
    Configuration,
    UnknownResource,
    FailedPrecondition,
    PermissionDenied,
    Serialization,
}

/// Errors produced by lifecycle operations and their collaborators.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A resource ID did not match the expected segment grammar.
    #[error("Malformed resource ID {id:?}: {reason}")]
    MalformedId {
        /// The raw ID that failed to parse.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The resource already exists and must be imported instead of created.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The remote API rejected the request (4xx validation class).
    #[error("Remote rejected request (HTTP {status}): {message}")]
    RemoteRejected {
        /// HTTP status code returned by the remote API.
        status: u16,
        /// Response body or message, verbatim.
        message: String,
    },

    /// The remote API reported a conflicting concurrent operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The remote API throttled the request.
    #[error("Throttled: {0}")]
    Throttled(String),

    /// A transient network or server failure.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// A long-running operation reached a terminal failure state.
    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    /// Waiting for an operation exceeded its budget.
    #[error("Timed out after {elapsed:?} waiting for operation (last status: {last_status})")]
    Timeout {
        /// Time spent waiting before giving up.
        elapsed: Duration,
        /// The last non-terminal status observed.
        last_status: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Changed attributes cannot be updated in place.
    #[error("Changing {} requires replacing the resource", .0.join(", "))]
    RequiresReplacement(Vec<String>),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error annotated with the identity of the resource it concerns.
    #[error("{context}: {source}")]
    Resource {
        /// The resource the operation was acting on.
        context: ResourceContext,
        /// The underlying failure.
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Create a [`ProviderError::MalformedId`].
    pub fn malformed_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Attach resource identity to this error.
    ///
    /// An error that already carries a context keeps its original one.
    pub fn with_context(self, context: ResourceContext) -> Self {
        match self {
            Self::Resource { .. } => self,
            other => Self::Resource {
                context,
                source: Box::new(other),
            },
        }
    }

    /// The classification of this error, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedId { .. } => ErrorKind::MalformedId,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Throttled(_) => ErrorKind::Throttled,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::RemoteOperationFailed(_) => ErrorKind::RemoteOperationFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::RequiresReplacement(_) => ErrorKind::RequiresReplacement,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::UnknownResource(_) => ErrorKind::UnknownResource,
            Self::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Resource { source, .. } => source.kind(),
        }
    }

    /// Whether the failure is transient and safe to retry for idempotent calls.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Throttled | ErrorKind::TransientNetwork
        )
    }

    /// Whether the remote reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// The resource context attached to this error, if any.
    pub fn context(&self) -> Option<&ResourceContext> {
        match self {
            Self::Resource { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::MalformedId { reason, .. } => reason.clone(),
            Self::AlreadyExists(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Throttled(msg)
            | Self::TransientNetwork(msg)
            | Self::RemoteOperationFailed(msg)
            | Self::Cancelled(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::FailedPrecondition(msg)
            | Self::PermissionDenied(msg) => msg.clone(),
            Self::RemoteRejected { message, .. } => message.clone(),
            Self::Timeout { last_status, .. } => format!("last status: {}", last_status),
            Self::RequiresReplacement(fields) => fields.join(", "),
            Self::Serialization(err) => err.to_string(),
            Self::Resource { source, .. } => source.message(),
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let attribute = match &err {
            ProviderError::RequiresReplacement(fields) => fields.first().cloned(),
            _ => None,
        };
        let diagnostic = Diagnostic::error(err.to_string()).with_detail(format!("{:?}", err.kind()));
        match attribute {
            Some(attr) => diagnostic.with_attribute(attr),
            None => diagnostic,
        }
    }
}
