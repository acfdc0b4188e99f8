//! The remote resource-management API, as seen by lifecycle controllers.
//!
//! Controllers never speak HTTP themselves. Each resource family supplies a
//! [`RemoteClient`] that issues the actual requests; implementors use
//! [`classify_status`] to turn non-success responses into the crate's error
//! taxonomy so controllers and retries can act on them uniformly.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ProviderError, Result};
use crate::id::ResourceId;
use crate::waiter::LongRunningOperation;

/// Remote API calls for one resource family.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Typed identity of the resources this client manages.
    type Id: ResourceId;
    /// Body of a create (PUT) request.
    type CreatePayload: Send + Sync;
    /// Body of an update request (PATCH body, or a full PUT body).
    type UpdatePayload: Send + Sync;
    /// The remote API's representation of the resource.
    type State: Send + Sync;
    /// Handle returned by mutating calls.
    type Operation: LongRunningOperation;

    /// Fetch the resource; `Ok(None)` means the remote reported not found.
    async fn get(&self, id: &Self::Id) -> Result<Option<Self::State>>;

    /// Submit a create request.
    async fn create(&self, id: &Self::Id, payload: Self::CreatePayload) -> Result<Self::Operation>;

    /// Submit an update request.
    async fn update(&self, id: &Self::Id, payload: Self::UpdatePayload) -> Result<Self::Operation>;

    /// Submit a delete request.
    async fn delete(&self, id: &Self::Id) -> Result<Self::Operation>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Summarize an error response body as `code: message`.
///
/// Bodies that are not the `{"error": {"code", "message"}}` envelope are
/// returned unchanged.
pub fn error_summary(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) if !error.code.is_empty() && !error.message.is_empty() => {
            format!("{}: {}", error.code, error.message)
        },
        Ok(ErrorEnvelope { error }) if !error.code.is_empty() => error.code,
        Ok(ErrorEnvelope { error }) if !error.message.is_empty() => error.message,
        _ => body.to_string(),
    }
}

/// Map a non-success HTTP status and its body to a [`ProviderError`].
///
/// | Status | Error |
/// |--------|-------|
/// | 401, 403 | `PermissionDenied` |
/// | 404 | `NotFound` |
/// | 408, 429 | `Throttled` |
/// | 409 | `Conflict` |
/// | other 4xx | `RemoteRejected` (body verbatim) |
/// | 500, 502, 503, 504 | `TransientNetwork` |
/// | other 5xx | `RemoteRejected` (body verbatim) |
pub fn classify_status(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::PermissionDenied(error_summary(body)),
        404 => ProviderError::NotFound(error_summary(body)),
        408 | 429 => ProviderError::Throttled(format!("HTTP {}: {}", status, error_summary(body))),
        409 => ProviderError::Conflict(error_summary(body)),
        500 | 502 | 503 | 504 => {
            ProviderError::TransientNetwork(format!("HTTP {}: {}", status, error_summary(body)))
        },
        400..=599 => ProviderError::RemoteRejected {
            status,
            message: body.to_string(),
        },
        _ => ProviderError::RemoteRejected {
            status,
            message: format!("unexpected HTTP status: {}", body),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const CONFLICT: &str = r#"{"error":{"code":"AnotherOperationInProgress","message":"Another operation on this resource is in progress"}}"#;

    #[test]
    fn test_error_summary() {
        assert_eq!(
            error_summary(CONFLICT),
            "AnotherOperationInProgress: Another operation on this resource is in progress"
        );
        assert_eq!(error_summary(r#"{"error":{"code":"Gone"}}"#), "Gone");
        assert_eq!(error_summary("upstream timed out"), "upstream timed out");
        assert_eq!(error_summary(r#"{"message":"x"}"#), r#"{"message":"x"}"#);
    }

    #[test]
    fn test_classify_status() {
        let cases = [
            (401, ErrorKind::PermissionDenied),
            (403, ErrorKind::PermissionDenied),
            (404, ErrorKind::NotFound),
            (408, ErrorKind::Throttled),
            (409, ErrorKind::Conflict),
            (400, ErrorKind::RemoteRejected),
            (422, ErrorKind::RemoteRejected),
            (429, ErrorKind::Throttled),
            (500, ErrorKind::TransientNetwork),
            (502, ErrorKind::TransientNetwork),
            (503, ErrorKind::TransientNetwork),
            (504, ErrorKind::TransientNetwork),
            (501, ErrorKind::RemoteRejected),
            (505, ErrorKind::RemoteRejected),
            (302, ErrorKind::RemoteRejected),
        ];
        for (status, kind) in cases {
            assert_eq!(classify_status(status, "{}").kind(), kind, "status {}", status);
        }
    }

    #[test]
    fn test_rejections_keep_body_verbatim() {
        let body = r#"{"error":{"code":"InvalidSku","message":"SKU 'Gold' is not valid"}}"#;
        match classify_status(400, body) {
            ProviderError::RemoteRejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, body);
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_only_transient_statuses_retry() {
        assert!(classify_status(429, "").is_retryable());
        assert!(classify_status(502, "").is_retryable());
        assert!(!classify_status(409, CONFLICT).is_retryable());
        assert!(!classify_status(400, "").is_retryable());
        assert!(!classify_status(501, "Not Implemented").is_retryable());
        assert!(!classify_status(505, "").is_retryable());
    }
}
