//! Error types surfaced by endpoint dispatch.
//!
//! Every remote call made through a controller settles into a
//! `Result<Value, FetchError>`. The variants separate the three ways a call
//! can fail:
//!
//! - the remote layer answered with a failing response envelope
//!   ([`FetchError::Transport`]),
//! - mocking was enabled but no substitute was registered for the endpoint
//!   ([`FetchError::MockNotRegistered`]),
//! - the remote function itself returned an error ([`FetchError::Remote`]),
//!   which is passed through unmodified.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while dispatching an endpoint call.
///
/// `FetchError` is `Clone` so that it can be stored in per-call-site request
/// state and handed to processing hooks without moving it out of the state.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The remote layer returned a response envelope with status >= 400.
    ///
    /// The display form is the envelope's status text.
    #[error("{status_text}")]
    Transport {
        /// HTTP-like status code from the envelope.
        status: u16,
        /// Status text from the envelope.
        status_text: String,
        /// The full envelope, as returned by the remote layer.
        envelope: Box<Value>,
    },

    /// Mocking is active but no mock function was registered for the endpoint.
    #[error("Mock endpoint not defined for: {endpoint_id}")]
    MockNotRegistered {
        /// The `controller.endpoint` identifier that was looked up.
        endpoint_id: String,
    },

    /// Error raised by a remote function, passed through unchanged.
    #[error(transparent)]
    Remote(Arc<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wrap an arbitrary error raised by a remote function.
    pub fn remote(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Remote(Arc::from(error.into()))
    }

    /// Status code of a transport failure, if this is one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The failing envelope of a transport failure, if this is one.
    #[must_use]
    pub fn envelope(&self) -> Option<&Value> {
        match self {
            Self::Transport { envelope, .. } => Some(&**envelope),
            _ => None,
        }
    }

    /// Whether the error was caused by a missing mock registration.
    #[must_use]
    pub const fn is_mock_miss(&self) -> bool {
        matches!(self, Self::MockNotRegistered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_displays_status_text() {
        let error = FetchError::Transport {
            status: 404,
            status_text: "Not Found".to_string(),
            envelope: Box::new(json!({ "status": 404, "statusText": "Not Found" })),
        };

        assert_eq!(error.to_string(), "Not Found");
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.envelope().and_then(|e| e.get("status")), Some(&json!(404)));
    }

    #[test]
    fn test_mock_miss_message_names_endpoint() {
        let error = FetchError::MockNotRegistered {
            endpoint_id: "users.getUser".to_string(),
        };

        assert_eq!(error.to_string(), "Mock endpoint not defined for: users.getUser");
        assert!(error.is_mock_miss());
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_remote_error_is_transparent() {
        let error = FetchError::remote("Unexpected error");
        assert_eq!(error.to_string(), "Unexpected error");

        let cloned = error.clone();
        assert_eq!(cloned.to_string(), "Unexpected error");
        assert!(!cloned.is_mock_miss());
    }
}
