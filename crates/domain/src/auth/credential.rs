//! Bearer credentials and their freshness rules.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::TokenGrant;
use crate::error::{DomainError, DomainResult};

/// Encoding the identity provider uses for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormat {
    /// Three dot-separated, non-empty base64url segments.
    #[default]
    Jwt,
    /// Any non-empty string.
    Opaque,
}

impl TokenFormat {
    /// Checks that `token` has the structure this format requires.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedToken`] if the token is empty or, for
    /// [`TokenFormat::Jwt`], does not have exactly three non-empty segments.
    pub fn validate(self, token: &str) -> DomainResult<()> {
        if token.trim().is_empty() {
            return Err(DomainError::MalformedToken("token is empty".to_string()));
        }
        if self == Self::Jwt {
            let segments: Vec<&str> = token.split('.').collect();
            if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
                return Err(DomainError::MalformedToken(format!(
                    "expected 3 non-empty segments, found {}",
                    segments.iter().filter(|s| !s.is_empty()).count()
                )));
            }
        }
        Ok(())
    }
}

/// Registered time claims read from a JWT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenClaims {
    /// Issued-at, seconds since the epoch.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Decodes the payload segment of a JWT without verifying its signature.
    ///
    /// Returns `None` for opaque tokens or undecodable payloads.
    #[must_use]
    pub fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| URL_SAFE.decode(payload))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Issued-at as a timestamp.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|s| Utc.timestamp_opt(s, 0).single())
    }
}

/// When a credential should be proactively replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Window before expiry in which the token counts as stale.
    pub margin: Duration,
    /// Lifetime assumed when neither the provider nor the token states one.
    pub nominal_lifetime: Duration,
}

impl FreshnessPolicy {
    /// Five minute margin on a sixty minute lifetime.
    pub const DEFAULT_MARGIN_SECS: i64 = 300;
    /// Lifetime the console's provider issues tokens for.
    pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

    /// Creates a policy from second counts, saturating out-of-range values.
    #[must_use]
    pub fn from_secs(margin_secs: i64, nominal_lifetime_secs: i64) -> Self {
        Self {
            margin: saturating_seconds(margin_secs),
            nominal_lifetime: saturating_seconds(nominal_lifetime_secs),
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_MARGIN_SECS, Self::DEFAULT_LIFETIME_SECS)
    }
}

/// The live access credential of a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer value attached to outbound requests.
    pub access_token: String,
    /// Longer-lived value used only to mint a new access token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token was issued.
    pub issued_at: DateTime<Utc>,
    /// When the access token expires, if known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a credential issued at `issued_at`.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            issued_at,
            expires_at,
        }
    }

    /// Builds a credential from a provider grant received at `now`.
    ///
    /// The stated `expires_in` wins; otherwise the token's own `iat`/`exp`
    /// claims are used; with neither, expiry falls to the nominal lifetime. A
    /// stated lifetime too large to represent counts as not stated. A grant
    /// without a refresh token keeps `previous`'s.
    #[must_use]
    pub fn from_grant(grant: &TokenGrant, now: DateTime<Utc>, previous: Option<&Self>) -> Self {
        let claims = TokenClaims::decode(&grant.access_token).unwrap_or_default();
        let issued_at = claims.issued_at().filter(|iat| *iat <= now).unwrap_or(now);
        let expires_at = grant
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .or_else(|| claims.expires_at());
        let refresh_token = grant
            .refresh_token
            .clone()
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        Self {
            access_token: grant.access_token.clone(),
            refresh_token,
            issued_at,
            expires_at,
        }
    }

    /// Expiry used for freshness decisions.
    #[must_use]
    pub fn effective_expiry(&self, policy: &FreshnessPolicy) -> DateTime<Utc> {
        self.expires_at.unwrap_or_else(|| {
            self.issued_at
                .checked_add_signed(policy.nominal_lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// The instant at which the token becomes stale.
    #[must_use]
    pub fn stale_at(&self, policy: &FreshnessPolicy) -> DateTime<Utc> {
        self.effective_expiry(policy)
            .checked_sub_signed(policy.margin)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns true if the token is outside the freshness margin at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, policy: &FreshnessPolicy) -> bool {
        now < self.stale_at(policy)
    }

    /// Returns true if the token is past its effective expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, policy: &FreshnessPolicy) -> bool {
        now >= self.effective_expiry(policy)
    }

    /// Seconds until effective expiry; negative once expired.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>, policy: &FreshnessPolicy) -> i64 {
        (self.effective_expiry(policy) - now).num_seconds()
    }

    /// Returns true if the credential carries a refresh token.
    #[must_use]
    pub const fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Checks the access token against `format`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MalformedToken`] if the structure is wrong.
    pub fn validate(&self, format: TokenFormat) -> DomainResult<()> {
        format.validate(&self.access_token)
    }

    /// Returns the Authorization header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// First characters of the access token, safe for logs.
    #[must_use]
    pub fn preview(&self) -> String {
        token_preview(&self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.preview())
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn saturating_seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(if secs < 0 { Duration::MIN } else { Duration::MAX })
}

/// Get a preview of a token (first 8 chars + ...).
#[must_use]
pub fn token_preview(token: &str) -> String {
    if token.len() > 12 {
        let cut = token
            .char_indices()
            .nth(8)
            .map_or(token.len(), |(idx, _)| idx);
        format!("{}...", &token[..cut])
    } else {
        token.to_string()
    }
}
