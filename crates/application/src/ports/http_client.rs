//! HTTP Client port

use async_trait::async_trait;
use thiserror::Error;
use tollgate_domain::{ClientError, ErrorKind, RequestSpec, ResponseSpec};

/// Port for sending a single HTTP request.
///
/// Any status the server answers with, including 4xx and 5xx, is a
/// successful `execute`; only transport-level failures are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request once.
    ///
    /// # Errors
    ///
    /// Returns an error if no response was received.
    async fn execute(&self, request: &RequestSpec) -> Result<ResponseSpec, HttpClientError>;
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpClientError {
    /// The request timed out.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The host name could not be resolved.
    #[error("could not resolve {host}: {message}")]
    DnsError {
        /// Host that failed to resolve.
        host: String,
        /// Resolver message.
        message: String,
    },

    /// The server refused the connection.
    #[error("connection refused by {host}:{port}")]
    ConnectionRefused {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
    },

    /// The connection failed or dropped.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The URL could not be used.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The body could not be sent.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl HttpClientError {
    /// Returns true if sending the same request again may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::DnsError { .. }
                | Self::ConnectionRefused { .. }
                | Self::ConnectionFailed(_)
        )
    }
}

impl From<HttpClientError> for ClientError {
    fn from(error: HttpClientError) -> Self {
        let kind = match &error {
            HttpClientError::Timeout { .. } => ErrorKind::Timeout,
            HttpClientError::InvalidUrl(_) | HttpClientError::InvalidBody(_) => {
                ErrorKind::InvalidRequest
            }
            _ => ErrorKind::Network,
        };
        Self::new(kind, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(HttpClientError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(HttpClientError::ConnectionFailed("reset".into()).is_transient());
        assert!(!HttpClientError::Tls("bad cert".into()).is_transient());
        assert!(!HttpClientError::InvalidUrl("x".into()).is_transient());
    }

    #[test]
    fn test_into_client_error() {
        let err: ClientError = HttpClientError::Timeout { timeout_ms: 5 }.into();
        assert_eq!(err.kind, ErrorKind::Timeout);
        let err: ClientError = HttpClientError::InvalidBody("x".into()).into();
        assert!(err.is_caller_fixable());
    }
}
