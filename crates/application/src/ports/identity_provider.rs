//! Identity provider port

use async_trait::async_trait;
use thiserror::Error;
use tollgate_domain::{Credential, SignInCredentials, TokenGrant};

/// Issues and renews bearer tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges operator credentials for a token.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidCredentials`] if refused,
    /// [`ProviderError::Unavailable`] if unreachable.
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<TokenGrant, ProviderError>;

    /// Renews the session `current` belongs to.
    ///
    /// Token-exchange providers spend `current.refresh_token`. Providers
    /// that keep their own session (see [`Self::renews_own_session`]) may
    /// mint a new token without one.
    ///
    /// # Errors
    ///
    /// [`ProviderError::RefreshRejected`] if the session can no longer be
    /// renewed, [`ProviderError::Unavailable`] on transient trouble.
    async fn refresh(&self, current: &Credential) -> Result<TokenGrant, ProviderError>;

    /// Returns true if [`Self::refresh`] works without a refresh token.
    fn renews_own_session(&self) -> bool {
        false
    }

    /// Tells the provider the session is over. Best effort.
    ///
    /// # Errors
    ///
    /// Any provider failure; callers log and continue.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;
}

/// Identity provider failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Sign-in credentials refused.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Refresh token refused. Terminal for the session.
    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    /// Network failure, timeout, 429 or 5xx.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something unreadable.
    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Returns true if the same call may succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
