//! Client settings
//!
//! Every field has a default so a partial file or a handful of environment
//! overrides is enough to build a working client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{FreshnessPolicy, TokenFormat};
use crate::error::{DomainError, DomainResult};
use crate::retry::{DEFAULT_RETRYABLE_STATUSES, RetryPolicy};

/// Top-level client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Backend root, e.g. `https://admin.example.com/api`.
    pub base_url: String,
    /// Per-request transport timeout.
    pub timeout_ms: u64,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Token lifecycle settings.
    pub auth: AuthSettings,
    /// Transient-failure retry settings.
    pub retry: RetrySettings,
    /// Identity provider endpoints.
    pub identity: IdentitySettings,
    /// Session persistence.
    pub storage: StorageSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_ms: 30_000,
            user_agent: concat!("tollgate/", env!("CARGO_PKG_VERSION")).to_string(),
            auth: AuthSettings::default(),
            retry: RetrySettings::default(),
            identity: IdentitySettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Transport timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parses `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidUrl`] if it is not an http(s) URL.
    pub fn base_url(&self) -> DomainResult<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| DomainError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DomainError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// Checks that the settings describe a usable client.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> DomainResult<()> {
        self.base_url()?;
        if self.timeout_ms == 0 {
            return Err(DomainError::InvalidSettings("timeout_ms must be positive".into()));
        }
        self.auth.validate()?;
        self.retry.validate()
    }
}

/// Token lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Refresh this many seconds before expiry.
    pub freshness_margin_secs: u64,
    /// Lifetime assumed when neither the provider nor the token states one.
    pub nominal_lifetime_secs: u64,
    /// Refresh proactively in the background.
    pub background_refresh: bool,
    /// Expected access token encoding.
    pub token_format: TokenFormat,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            freshness_margin_secs: 300,
            nominal_lifetime_secs: 3600,
            background_refresh: true,
            token_format: TokenFormat::Jwt,
        }
    }
}

impl AuthSettings {
    /// Freshness policy derived from these settings.
    #[must_use]
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::from_secs(
            i64::try_from(self.freshness_margin_secs).unwrap_or(i64::MAX / 2),
            i64::try_from(self.nominal_lifetime_secs).unwrap_or(i64::MAX / 2),
        )
    }

    fn validate(&self) -> DomainResult<()> {
        if self.nominal_lifetime_secs == 0 {
            return Err(DomainError::InvalidSettings(
                "auth.nominal_lifetime_secs must be positive".into(),
            ));
        }
        if self.freshness_margin_secs >= self.nominal_lifetime_secs {
            return Err(DomainError::InvalidSettings(
                "auth.freshness_margin_secs must be shorter than the token lifetime".into(),
            ));
        }
        Ok(())
    }
}

/// Transient-failure retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Growth factor between delays.
    pub multiplier: f64,
    /// Cap on any single delay.
    pub max_delay_ms: u64,
    /// Statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
    /// Honor `Retry-After`.
    pub respect_retry_after: bool,
    /// Randomize delays.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            respect_retry_after: true,
            jitter: false,
        }
    }
}

impl RetrySettings {
    /// Retry policy derived from these settings.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            retryable_statuses: self.retryable_statuses.iter().copied().collect(),
            respect_retry_after: self.respect_retry_after,
            jitter: self.jitter,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(DomainError::InvalidSettings(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(DomainError::InvalidSettings(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if let Some(status) = self
            .retryable_statuses
            .iter()
            .find(|s| !(100..=599).contains(*s) || **s == 401)
        {
            return Err(DomainError::InvalidSettings(format!(
                "retry.retryable_statuses contains {status}"
            )));
        }
        Ok(())
    }
}

/// Identity provider endpoint paths, relative to `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Sign-in endpoint.
    pub sign_in_path: String,
    /// Token refresh endpoint.
    pub refresh_path: String,
    /// Sign-out endpoint.
    pub sign_out_path: String,
    /// Current user endpoint.
    pub profile_path: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            sign_in_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            sign_out_path: "/auth/logout".to_string(),
            profile_path: "/auth/me".to_string(),
        }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Session file; the platform config dir is used when unset.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ClientSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.identity.refresh_path, "/auth/refresh");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: ClientSettings =
            serde_json::from_str(r#"{"base_url":"https://x.test/api","retry":{"max_retries":1}}"#)
                .unwrap();
        assert_eq!(settings.retry.max_retries, 1);
        assert_eq!(settings.retry.base_delay_ms, 1000);
        assert_eq!(settings.auth.freshness_margin_secs, 300);
    }

    #[test]
    fn test_policies() {
        let settings = ClientSettings::default();
        let policy = settings.retry.policy();
        assert_eq!(policy.max_attempts(), 4);
        assert!(policy.is_retryable_status(503));

        let freshness = settings.auth.freshness_policy();
        assert_eq!(freshness.margin, chrono::Duration::minutes(5));
        assert_eq!(freshness.nominal_lifetime, chrono::Duration::minutes(60));
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let mut settings = ClientSettings::default();
        settings.base_url = "ftp://x".into();
        assert!(settings.validate().is_err());

        let mut settings = ClientSettings::default();
        settings.retry.multiplier = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = ClientSettings::default();
        settings.retry.retryable_statuses.push(401);
        assert!(settings.validate().is_err());

        let mut settings = ClientSettings::default();
        settings.auth.freshness_margin_secs = 3600;
        assert!(settings.validate().is_err());
    }
}
