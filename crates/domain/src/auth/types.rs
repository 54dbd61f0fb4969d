//! Payloads exchanged with the identity provider.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the operator types into the sign-in form.
#[derive(Clone, PartialEq, Eq)]
pub struct SignInCredentials {
    /// Username or email.
    pub identifier: String,
    /// Plain-text password; never logged.
    pub password: String,
}

impl SignInCredentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }

    /// Returns true if both fields are filled in.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.identifier.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for SignInCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInCredentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A token issued by the provider on sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: String,
    /// New refresh token, if the provider rotated it.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, if the provider stated one.
    pub expires_in: Option<u64>,
    /// Signed-in user, returned with sign-in responses.
    pub user: Option<UserProfile>,
}

impl TokenGrant {
    /// Creates a grant carrying only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            user: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the stated lifetime.
    #[must_use]
    pub const fn with_expires_in(mut self, secs: u64) -> Self {
        self.expires_in = Some(secs);
        self
    }

    /// Attaches the user profile.
    #[must_use]
    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }
}

/// Cached snapshot of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend identifier.
    #[serde(alias = "_id")]
    pub id: String,
    /// Login name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Role, e.g. `admin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Any other fields the backend sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Creates a profile with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            email: None,
            full_name: None,
            role: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Best human-readable label for this user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = SignInCredentials::new("admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials_completeness() {
        assert!(SignInCredentials::new("admin", "pw").is_complete());
        assert!(!SignInCredentials::new("  ", "pw").is_complete());
        assert!(!SignInCredentials::new("admin", "").is_complete());
    }

    #[test]
    fn test_profile_from_backend_json() {
        let json = r#"{"_id":"64f0","username":"admin","fullName":"Ada Admin","role":"admin","isVerified":true}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.id, "64f0");
        assert_eq!(profile.full_name.as_deref(), Some("Ada Admin"));
        assert_eq!(profile.display_name(), "Ada Admin");
        assert_eq!(profile.extra.get("isVerified"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(UserProfile::new("u-1").display_name(), "u-1");
    }

    #[test]
    fn test_grant_equality_includes_user() {
        let grant = TokenGrant::new("access")
            .with_refresh_token("refresh")
            .with_user(UserProfile::new("u-1"));

        assert_eq!(grant.clone(), grant);
        assert_ne!(grant.clone().with_user(UserProfile::new("u-2")), grant);
    }
}
