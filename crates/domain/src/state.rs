//! Authentication state machine states.
//!
//! The token manager is the only component allowed to move between these
//! states. The permitted edges are:
//!
//! ```text
//! SignedOut      --sign in submitted-->      Authenticating
//! Authenticating --provider accepted-->      Valid
//! Authenticating --provider refused-->       SignedOut
//! Valid          --stale or forced-->        Refreshing
//! Refreshing     --new token-->              Valid
//! Refreshing     --refresh rejected-->       Invalid
//! Invalid        --any request-->            SignedOut
//! any            --sign out-->               SignedOut
//! any settled    --sign in submitted-->      Authenticating
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a session currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No credential is held.
    #[default]
    SignedOut,
    /// A sign-in call is in flight.
    Authenticating,
    /// A credential is held and usable.
    Valid,
    /// Exactly one refresh call is in flight.
    Refreshing,
    /// The refresh credential was rejected; the session is dead.
    Invalid,
}

impl AuthState {
    /// Returns true while a provider call is outstanding and callers must queue.
    #[must_use]
    pub const fn is_settling(self) -> bool {
        matches!(self, Self::Authenticating | Self::Refreshing)
    }

    /// Returns true if a credential is held (possibly being refreshed).
    #[must_use]
    pub const fn has_credential(self) -> bool {
        matches!(self, Self::Valid | Self::Refreshing)
    }

    /// Returns true if moving from `self` to `next` is a legal edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::SignedOut, Self::Authenticating)
            | (Self::Authenticating, Self::Valid | Self::SignedOut)
            | (Self::Valid, Self::Refreshing)
            | (Self::Refreshing, Self::Valid | Self::Invalid)
            | (_, Self::SignedOut)
            // Re-authenticating replaces whatever session exists.
            | (Self::Valid | Self::Refreshing | Self::Invalid, Self::Authenticating) => true,
            _ => false,
        }
    }

    /// Returns the state as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignedOut => "signed_out",
            Self::Authenticating => "authenticating",
            Self::Valid => "valid",
            Self::Refreshing => "refreshing",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
