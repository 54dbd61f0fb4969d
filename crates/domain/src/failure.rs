//! The single error shape callers of the pipeline see.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::response::{ResponseSpec, StatusCode};

/// What went wrong with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable credential, or the backend rejected a fresh one.
    Unauthenticated,
    /// The refresh credential was rejected; the session has ended.
    RefreshRejected,
    /// A refresh could not complete because the provider was unreachable.
    RefreshFailed,
    /// The session was signed out while the request waited.
    Cancelled,
    /// The request never reached the backend.
    Network,
    /// The backend did not answer in time.
    Timeout,
    /// A transient status persisted through every retry.
    Exhausted,
    /// The backend answered with a non-retryable error status.
    Http,
    /// The request was rejected before sending.
    InvalidRequest,
    /// A successful response body could not be decoded.
    Decode,
}

impl ErrorKind {
    /// Returns the kind as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RefreshRejected => "refresh_rejected",
            Self::RefreshFailed => "refresh_failed",
            Self::Cancelled => "cancelled",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Exhausted => "exhausted",
            Self::Http => "http",
            Self::InvalidRequest => "invalid_request",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can fix an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The caller sent something wrong (4xx other than 401).
    CallerFixable,
    /// Auth, network or server trouble.
    Systemic,
}

/// Normalized request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ClientError {
    /// Failure category.
    pub kind: ErrorKind,
    /// HTTP status, when the backend answered.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Creates an error without a status.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Builds an error from a failed response, reading the body's message.
    #[must_use]
    pub fn from_response(kind: ErrorKind, response: &ResponseSpec) -> Self {
        Self {
            kind,
            status: Some(response.status.as_u16()),
            message: extract_message(&response.body, response.status),
        }
    }

    /// Shorthand for an [`ErrorKind::Unauthenticated`] error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    /// Attaches a status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Classifies the error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match (self.kind, self.status) {
            (ErrorKind::InvalidRequest, _) => ErrorClass::CallerFixable,
            (ErrorKind::Http, Some(status))
                if StatusCode::new(status).is_client_error() && status != 401 =>
            {
                ErrorClass::CallerFixable
            }
            _ => ErrorClass::Systemic,
        }
    }

    /// Returns true if the caller can fix this by changing the request.
    #[must_use]
    pub fn is_caller_fixable(&self) -> bool {
        self.class() == ErrorClass::CallerFixable
    }

    /// Returns true if the session can no longer authenticate requests.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthenticated | ErrorKind::RefreshRejected
        )
    }
}

/// Picks the most useful message out of an error response body.
///
/// Looks for a string `message`, then `error` (a string or an object with
/// its own `message`), and falls back to the status reason phrase.
#[must_use]
pub fn extract_message(body: &[u8], status: StatusCode) -> String {
    let from_body = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            let message = json.get("message").and_then(|m| m.as_str());
            let error = json.get("error").and_then(|e| {
                e.as_str()
                    .or_else(|| e.get("message").and_then(|m| m.as_str()))
            });
            message.or(error).map(str::to_string)
        })
        .filter(|m| !m.trim().is_empty());

    from_body.unwrap_or_else(|| status.reason_phrase().to_string())
}
