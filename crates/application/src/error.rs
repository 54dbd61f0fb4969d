//! Application error types

use thiserror::Error;
use tollgate_domain::{ClientError, DomainError, ErrorKind};

/// Failures of the token lifecycle contract.
///
/// Cloneable because one refresh outcome is delivered to every queued caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No session is established.
    #[error("not signed in")]
    Unauthenticated,

    /// The provider refused the sign-in credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The refresh credential was refused; the session has ended.
    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    /// A refresh could not complete; the previous credential is kept.
    #[error("refresh failed: {0}")]
    RefreshFailed(String),

    /// The provider could not be reached during sign-in.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The session was signed out while the caller waited.
    #[error("cancelled by sign-out")]
    Cancelled,

    /// Another sign-in is already in flight.
    #[error("a sign-in is already in progress")]
    SignInInProgress,

    /// The provider issued a token with the wrong structure.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The credential store failed.
    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl From<StorageError> for AuthError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<DomainError> for AuthError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::MalformedToken(msg) => Self::MalformedToken(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<AuthError> for ClientError {
    fn from(error: AuthError) -> Self {
        let kind = match &error {
            AuthError::RefreshRejected(_) => ErrorKind::RefreshRejected,
            AuthError::RefreshFailed(_) | AuthError::ProviderUnavailable(_) => {
                ErrorKind::RefreshFailed
            }
            AuthError::Cancelled => ErrorKind::Cancelled,
            AuthError::Unauthenticated
            | AuthError::InvalidCredentials(_)
            | AuthError::SignInInProgress
            | AuthError::MalformedToken(_)
            | AuthError::Storage(_) => ErrorKind::Unauthenticated,
        };
        Self::new(kind, error.to_string())
    }
}

/// Key-value store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}
