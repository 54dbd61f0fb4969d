//! Session controller.
//!
//! Turns token manager events into one status the presentation layer can
//! watch, and fronts the operations that start or end a session.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tollgate_domain::{ClientError, ErrorKind, SignInCredentials, UserProfile};
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, SessionEndReason, TokenManager};
use crate::error::AuthError;
use crate::pipeline::ApiClient;

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Signed in.
    Active {
        /// Cached profile, if known.
        user: Option<UserProfile>,
    },
    /// The session ended on its own; show the sign-in screen.
    SignInRequired {
        /// Why it ended.
        reason: SessionEndReason,
    },
    /// Not signed in, or signed out by the operator.
    SignedOut,
}

impl SessionStatus {
    /// Returns true while a session is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Fronts the session for the presentation layer.
pub struct SessionController {
    tokens: TokenManager,
    api: ApiClient,
    profile_path: String,
    status: watch::Sender<SessionStatus>,
    listener: JoinHandle<()>,
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl SessionController {
    /// Creates the controller and starts following `tokens`' events.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(tokens: TokenManager, api: ApiClient, profile_path: impl Into<String>) -> Self {
        let initial = if tokens.state().has_credential() {
            SessionStatus::Active {
                user: tokens.current_user(),
            }
        } else {
            SessionStatus::SignedOut
        };
        let (status, _) = watch::channel(initial);
        let listener = tokio::spawn(follow(tokens.subscribe(), status.clone()));
        Self {
            tokens,
            api,
            profile_path: profile_path.into(),
            status,
            listener,
        }
    }

    /// The token manager behind this session.
    #[must_use]
    pub const fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The authenticated API client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that sees every status change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Picks up a persisted session. Returns true if one was restored.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store could not be read.
    pub async fn restore(&self) -> Result<bool, AuthError> {
        let state = self.tokens.restore().await?;
        if state.has_credential() {
            self.publish(SessionStatus::Active {
                user: self.tokens.current_user(),
            });
        }
        Ok(state.has_credential())
    }

    /// Signs in and returns the signed-in user, if known.
    ///
    /// # Errors
    ///
    /// As for [`TokenManager::sign_in`].
    pub async fn sign_in(
        &self,
        credentials: SignInCredentials,
    ) -> Result<Option<UserProfile>, AuthError> {
        self.tokens.sign_in(credentials).await?;
        let user = self.tokens.current_user();
        if let Some(user) = &user {
            info!(user = %user.display_name(), "session started");
        }
        self.publish(SessionStatus::Active { user: user.clone() });
        Ok(user)
    }

    /// Signs out.
    ///
    /// # Errors
    ///
    /// As for [`TokenManager::sign_out`].
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.tokens.sign_out().await;
        self.publish(SessionStatus::SignedOut);
        result
    }

    /// Ends the session and asks the operator to sign in again.
    ///
    /// Returns true only for the call that ended it.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store could not be cleared.
    pub async fn require_sign_in(&self, reason: SessionEndReason) -> Result<bool, AuthError> {
        let ended = self.tokens.end_session(reason).await?;
        if ended {
            self.publish(ended_status(reason));
        }
        Ok(ended)
    }

    /// Fetches the signed-in user's profile and caches it.
    ///
    /// Accepts `{data: {user}}`, `{data}` or a bare profile object.
    ///
    /// # Errors
    ///
    /// Any pipeline [`ClientError`], or [`ErrorKind::Decode`] if no profile
    /// could be found in the response.
    pub async fn refresh_profile(&self) -> Result<UserProfile, ClientError> {
        let body: serde_json::Value = self.api.get(&self.profile_path).await?;
        let user = extract_profile(body).ok_or_else(|| {
            ClientError::new(ErrorKind::Decode, "response did not contain a user profile")
        })?;
        self.tokens.set_user(user.clone()).await?;
        debug!(user = %user.display_name(), "profile refreshed");
        Ok(user)
    }

    fn publish(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }
}

fn ended_status(reason: SessionEndReason) -> SessionStatus {
    if reason.requires_sign_in() {
        SessionStatus::SignInRequired { reason }
    } else {
        SessionStatus::SignedOut
    }
}

fn extract_profile(mut body: serde_json::Value) -> Option<UserProfile> {
    if let Some(data) = body.get_mut("data") {
        body = match data.get_mut("user") {
            Some(user) => user.take(),
            None => data.take(),
        };
    }
    serde_json::from_value(body).ok()
}

async fn follow(mut events: broadcast::Receiver<AuthEvent>, status: watch::Sender<SessionStatus>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session listener fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let next = match event {
            AuthEvent::SignedIn { user } | AuthEvent::Restored { user } => {
                SessionStatus::Active { user }
            }
            AuthEvent::ProfileUpdated { user } => SessionStatus::Active { user: Some(user) },
            AuthEvent::SessionEnded { reason } => {
                if reason.requires_sign_in() {
                    info!(%reason, "sign-in required");
                }
                ended_status(reason)
            }
            AuthEvent::Refreshed { .. } | AuthEvent::RefreshFailed { .. } => continue,
        };
        status.send_replace(next);
    }
}
