//! Session lifecycle events broadcast by the token manager.

use std::fmt;

use tollgate_domain::UserProfile;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEndReason {
    /// The operator signed out.
    SignedOut,
    /// The provider refused the refresh credential.
    RefreshRejected,
    /// The credential expired and could not be refreshed.
    Expired,
    /// The backend kept refusing a freshly refreshed credential.
    Unauthorized,
}

impl SessionEndReason {
    /// Returns true if the operator has to sign in again.
    #[must_use]
    pub const fn requires_sign_in(self) -> bool {
        !matches!(self, Self::SignedOut)
    }

    /// Text shown on the sign-in screen.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::SignedOut => "Signed out",
            Self::RefreshRejected => "Your session has ended. Please sign in again.",
            Self::Expired => "Your session has expired. Please sign in again.",
            Self::Unauthorized => "You are no longer authorized. Please sign in again.",
        }
    }
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SignedOut => "signed_out",
            Self::RefreshRejected => "refresh_rejected",
            Self::Expired => "expired",
            Self::Unauthorized => "unauthorized",
        })
    }
}

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A sign-in succeeded.
    SignedIn {
        /// Signed-in user, if the provider returned one.
        user: Option<UserProfile>,
    },
    /// A persisted session was picked up at startup.
    Restored {
        /// Cached user snapshot.
        user: Option<UserProfile>,
    },
    /// The access token was replaced.
    Refreshed {
        /// Preview of the new token.
        token_preview: String,
    },
    /// A refresh failed transiently; the old credential is still in use.
    RefreshFailed {
        /// Error message.
        error: String,
    },
    /// The cached user snapshot changed.
    ProfileUpdated {
        /// New snapshot.
        user: UserProfile,
    },
    /// The session is over. Emitted once per session.
    SessionEnded {
        /// Why it ended.
        reason: SessionEndReason,
    },
}
