//! Token status for display.

use chrono::{DateTime, Utc};
use tollgate_domain::{Credential, FreshnessPolicy};

/// How the current credential looks right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// No credential is held.
    NotAuthenticated,
    /// Credential is usable and outside the refresh margin.
    Valid {
        /// Seconds until effective expiry.
        seconds_remaining: i64,
    },
    /// Credential is inside the refresh margin.
    Expiring {
        /// Seconds until effective expiry.
        seconds_remaining: i64,
        /// Whether the credential can be refreshed.
        can_refresh: bool,
    },
    /// Credential is past its effective expiry.
    Expired {
        /// Whether the credential can be refreshed.
        can_refresh: bool,
    },
}

impl TokenStatus {
    /// Computes the status of `credential` at `now`.
    ///
    /// `provider_renews` is set when the provider can renew a session that
    /// carries no refresh token.
    #[must_use]
    pub fn of(
        credential: Option<&Credential>,
        now: DateTime<Utc>,
        policy: &FreshnessPolicy,
        provider_renews: bool,
    ) -> Self {
        let Some(credential) = credential else {
            return Self::NotAuthenticated;
        };
        let can_refresh = provider_renews || credential.has_refresh_token();
        if credential.is_expired(now, policy) {
            Self::Expired { can_refresh }
        } else if credential.is_fresh(now, policy) {
            Self::Valid {
                seconds_remaining: credential.seconds_until_expiry(now, policy),
            }
        } else {
            Self::Expiring {
                seconds_remaining: credential.seconds_until_expiry(now, policy),
                can_refresh,
            }
        }
    }

    /// Returns true if the token is valid (not expired).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. } | Self::Expiring { .. })
    }

    /// Returns true if the token needs attention (expiring or expired).
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        matches!(self, Self::Expiring { .. } | Self::Expired { .. })
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Not authenticated".to_string(),
            Self::Valid { seconds_remaining } => {
                let secs = *seconds_remaining;
                if secs > 3600 {
                    format!("Valid for {} hours", secs / 3600)
                } else if secs > 60 {
                    format!("Valid for {} minutes", secs / 60)
                } else {
                    format!("Valid for {secs} seconds")
                }
            }
            Self::Expiring {
                seconds_remaining,
                can_refresh,
            } => {
                let hint = if *can_refresh { " (will auto-refresh)" } else { "" };
                format!("Expiring in {seconds_remaining} seconds{hint}")
            }
            Self::Expired { can_refresh: true } => "Expired (can refresh)".to_string(),
            Self::Expired { can_refresh: false } => "Expired".to_string(),
        }
    }
}
