//! Token lifecycle manager.
//!
//! Owns the authentication state machine and is the only writer of the
//! credential store. All state lives behind one `parking_lot` mutex that is
//! never held across an `.await`; the decision to start a refresh and the
//! move into `Refreshing` happen in the same critical section, so at most one
//! refresh is ever in flight. Callers arriving while a provider call is
//! outstanding park on a oneshot channel and are settled together when it
//! completes.
//!
//! Provider calls run on spawned tasks. A caller that gives up waiting never
//! strands the state machine in `Authenticating` or `Refreshing`, and neither
//! does a task that dies before settling: its [`FlightGuard`] settles the
//! waiters and restores a settled state on drop.
//!
//! Every session has a generation number. Sign-in and session end bump it,
//! and any provider result or store write tagged with an older generation is
//! dropped, so a refresh that lands after sign-out cannot revive the session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tollgate_domain::{
    AuthSettings, AuthState, Credential, FreshnessPolicy, RetryPolicy, SignInCredentials,
    TokenFormat, UserProfile,
};
use tracing::{debug, info, warn};

use super::credential_store::CredentialStore;
use super::events::{AuthEvent, SessionEndReason};
use super::status::TokenStatus;
use crate::error::{AuthError, StorageError};
use crate::ports::{Clock, IdentityProvider, ProviderError};
use crate::retry::RetryExecutor;

const EVENT_CAPACITY: usize = 64;

type Settled = Result<Credential, AuthError>;
type Waiter = oneshot::Sender<Settled>;

/// Tuning for a [`TokenManager`].
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// When a credential counts as stale.
    pub freshness: FreshnessPolicy,
    /// Structure required of access tokens.
    pub token_format: TokenFormat,
    /// Refresh ahead of expiry on a timer.
    pub background_refresh: bool,
    /// Backoff for transient provider failures during refresh.
    pub refresh_retry: RetryPolicy,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            freshness: FreshnessPolicy::default(),
            token_format: TokenFormat::Jwt,
            background_refresh: true,
            refresh_retry: RetryPolicy::default(),
        }
    }
}

impl TokenManagerConfig {
    /// Builds the config from client settings.
    #[must_use]
    pub fn from_settings(auth: &AuthSettings, refresh_retry: RetryPolicy) -> Self {
        Self {
            freshness: auth.freshness_policy(),
            token_format: auth.token_format,
            background_refresh: auth.background_refresh,
            refresh_retry,
        }
    }
}

/// Shared handle to the session's credential.
///
/// Cloning is cheap; all clones drive the same state machine.
#[derive(Clone)]
pub struct TokenManager {
    shared: Arc<Shared>,
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    config: TokenManagerConfig,
    retry: RetryExecutor,
    inner: Mutex<Inner>,
    persist_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().background.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct Inner {
    state: AuthState,
    credential: Option<Credential>,
    user: Option<UserProfile>,
    waiters: Vec<Waiter>,
    generation: u64,
    flight: u64,
    background: Option<JoinHandle<()>>,
}

impl Inner {
    fn transition(&mut self, next: AuthState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal auth transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "auth state transition");
        self.state = next;
    }

    fn enqueue(&mut self) -> oneshot::Receiver<Settled> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Numbers a new provider call.
    fn start_flight(&mut self) -> u64 {
        self.flight += 1;
        self.flight
    }
}

/// Held by the task running a provider call.
///
/// If the task ends while its call is still the one in flight and the state
/// is still `Authenticating` or `Refreshing`, the call never settled: the
/// drop settles it as failed.
struct FlightGuard {
    manager: TokenManager,
    flight: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.manager.abandon_flight(self.flight);
    }
}

/// What a caller should do after the locked decision.
enum Demand {
    Ready(Credential),
    Wait(oneshot::Receiver<Settled>),
    End(SessionEndReason, AuthError),
    Fail(AuthError),
}

fn settle_all(waiters: Vec<Waiter>, outcome: &Settled) {
    for waiter in waiters {
        // A dropped receiver means that caller stopped waiting.
        let _ = waiter.send(outcome.clone());
    }
}

impl TokenManager {
    /// Creates a signed-out manager. Call [`Self::restore`] to pick up a
    /// persisted session.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        config: TokenManagerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let retry = RetryExecutor::new(config.refresh_retry.clone());
        Self {
            shared: Arc::new(Shared {
                provider,
                store,
                clock,
                config,
                retry,
                inner: Mutex::new(Inner::default()),
                persist_lock: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.shared.inner.lock().state
    }

    /// The held credential, without any freshness check.
    #[must_use]
    pub fn current_credential(&self) -> Option<Credential> {
        self.shared.inner.lock().credential.clone()
    }

    /// Cached profile of the signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.shared.inner.lock().user.clone()
    }

    /// Status of the held credential for display.
    #[must_use]
    pub fn status(&self) -> TokenStatus {
        let now = self.shared.clock.now();
        let inner = self.shared.inner.lock();
        TokenStatus::of(
            inner.credential.as_ref(),
            now,
            &self.shared.config.freshness,
            self.shared.provider.renews_own_session(),
        )
    }

    /// Freshness policy in force.
    #[must_use]
    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.shared.config.freshness
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.shared.events.subscribe()
    }

    /// Loads the persisted session once at startup.
    ///
    /// A persisted credential that is unreadable or structurally malformed
    /// is discarded and the store cleared.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store could not be read.
    pub async fn restore(&self) -> Result<AuthState, AuthError> {
        let (generation, flight) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != AuthState::SignedOut {
                return Ok(inner.state);
            }
            inner.transition(AuthState::Authenticating);
            inner.generation += 1;
            (inner.generation, inner.start_flight())
        };

        let this = self.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _guard = this.guard(flight);
            let _ = tx.send(this.run_restore(generation).await);
        });
        rx.await.unwrap_or(Err(AuthError::Cancelled))
    }

    /// Signs in with operator credentials, replacing any current session.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`], [`AuthError::ProviderUnavailable`],
    /// [`AuthError::MalformedToken`], or [`AuthError::SignInInProgress`] if
    /// another sign-in has not finished.
    pub async fn sign_in(&self, credentials: SignInCredentials) -> Result<Credential, AuthError> {
        if !credentials.is_complete() {
            return Err(AuthError::InvalidCredentials(
                "identifier and password are required".to_string(),
            ));
        }

        let (generation, flight, had_session, background) = {
            let mut inner = self.shared.inner.lock();
            if inner.state == AuthState::Authenticating {
                return Err(AuthError::SignInInProgress);
            }
            let had_session = inner.credential.is_some();
            inner.transition(AuthState::Authenticating);
            inner.credential = None;
            inner.user = None;
            inner.generation += 1;
            let flight = inner.start_flight();
            (inner.generation, flight, had_session, inner.background.take())
        };
        if let Some(task) = background {
            task.abort();
        }

        let this = self.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let _guard = this.guard(flight);
            let _ = tx.send(this.run_sign_in(generation, credentials, had_session).await);
        });
        rx.await.unwrap_or(Err(AuthError::Cancelled))
    }

    /// Returns a credential outside the freshness margin, refreshing first
    /// if needed.
    ///
    /// A stale credential that cannot be refreshed is still returned until it
    /// actually expires; after that the session ends.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] when signed out, otherwise whatever the
    /// refresh it waited on settled with.
    pub async fn get_valid_token(&self) -> Result<Credential, AuthError> {
        let now = self.shared.clock.now();
        let policy = &self.shared.config.freshness;
        let demand = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                AuthState::SignedOut => Demand::Fail(AuthError::Unauthenticated),
                AuthState::Invalid => {
                    Demand::End(SessionEndReason::RefreshRejected, AuthError::Unauthenticated)
                }
                AuthState::Authenticating | AuthState::Refreshing => Demand::Wait(inner.enqueue()),
                AuthState::Valid => match inner.credential.clone() {
                    None => Demand::Fail(AuthError::Unauthenticated),
                    Some(current) if current.is_fresh(now, policy) => Demand::Ready(current),
                    Some(current) if self.can_refresh(&current) => {
                        self.begin_refresh(&mut inner, current);
                        Demand::Wait(inner.enqueue())
                    }
                    Some(current) if !current.is_expired(now, policy) => Demand::Ready(current),
                    Some(_) => Demand::End(SessionEndReason::Expired, AuthError::Unauthenticated),
                },
            }
        };
        self.resolve(demand).await
    }

    /// Requests a new access token regardless of freshness.
    ///
    /// Joins the in-flight refresh if there is one.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshRejected`] (the session has ended),
    /// [`AuthError::RefreshFailed`], or [`AuthError::Unauthenticated`].
    pub async fn force_refresh(&self) -> Result<Credential, AuthError> {
        self.refresh_unless(None).await
    }

    /// Reacts to the backend refusing `rejected_token`.
    ///
    /// If the held credential has already moved past that token, it is
    /// returned as is; otherwise this behaves like [`Self::force_refresh`].
    /// Many requests failing with the same stale token cause one refresh.
    ///
    /// # Errors
    ///
    /// As for [`Self::force_refresh`].
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<Credential, AuthError> {
        self.refresh_unless(Some(rejected_token)).await
    }

    /// Signs out: clears the store, cancels waiters and tells the provider.
    ///
    /// Signing out an already signed-out manager does nothing.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store could not be cleared. The
    /// in-memory session is gone either way.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let token = self
            .shared
            .inner
            .lock()
            .credential
            .as_ref()
            .map(|c| c.access_token.clone());

        let ended = self
            .end_session_with(SessionEndReason::SignedOut, None, &AuthError::Cancelled)
            .await;

        if matches!(ended, Ok(true)) {
            if let Some(token) = token {
                if let Err(error) = self.shared.provider.sign_out(&token).await {
                    debug!(%error, "provider sign-out failed");
                }
            }
        }
        ended.map(|_| ()).map_err(AuthError::from)
    }

    /// Ends the session because it can no longer authenticate requests.
    ///
    /// Returns `true` only for the call that actually ended it; concurrent
    /// and repeated calls return `false`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] if the store could not be cleared.
    pub async fn end_session(&self, reason: SessionEndReason) -> Result<bool, AuthError> {
        self.end_session_with(reason, None, &AuthError::Unauthenticated)
            .await
            .map_err(AuthError::from)
    }

    /// Replaces the cached user profile.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] without a session,
    /// [`AuthError::Storage`] if persisting failed.
    pub async fn set_user(&self, user: UserProfile) -> Result<(), AuthError> {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if !inner.state.has_credential() {
                return Err(AuthError::Unauthenticated);
            }
            inner.user = Some(user.clone());
            inner.generation
        };
        self.persist(generation, None, Some(&user)).await?;
        self.emit(AuthEvent::ProfileUpdated { user });
        Ok(())
    }

    async fn refresh_unless(&self, rejected_token: Option<&str>) -> Result<Credential, AuthError> {
        let demand = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                AuthState::SignedOut => Demand::Fail(AuthError::Unauthenticated),
                AuthState::Invalid => {
                    Demand::End(SessionEndReason::RefreshRejected, AuthError::Unauthenticated)
                }
                AuthState::Authenticating | AuthState::Refreshing => Demand::Wait(inner.enqueue()),
                AuthState::Valid => match inner.credential.clone() {
                    None => Demand::Fail(AuthError::Unauthenticated),
                    Some(current)
                        if rejected_token.is_some_and(|t| t != current.access_token) =>
                    {
                        Demand::Ready(current)
                    }
                    Some(current) if self.can_refresh(&current) => {
                        self.begin_refresh(&mut inner, current);
                        Demand::Wait(inner.enqueue())
                    }
                    Some(_) => Demand::End(
                        SessionEndReason::RefreshRejected,
                        AuthError::RefreshRejected("no refresh token".to_string()),
                    ),
                },
            }
        };
        self.resolve(demand).await
    }

    async fn resolve(&self, demand: Demand) -> Result<Credential, AuthError> {
        match demand {
            Demand::Ready(credential) => Ok(credential),
            Demand::Wait(rx) => rx.await.unwrap_or(Err(AuthError::Cancelled)),
            Demand::End(reason, error) => {
                if let Err(storage) = self.end_session_with(reason, None, &error).await {
                    warn!(%storage, "could not clear persisted session");
                }
                Err(error)
            }
            Demand::Fail(error) => Err(error),
        }
    }

    /// Moves `Valid -> Refreshing` and starts the provider call.
    ///
    /// Must be called with the state lock held and the state `Valid`.
    fn begin_refresh(&self, inner: &mut Inner, current: Credential) {
        inner.transition(AuthState::Refreshing);
        let generation = inner.generation;
        let flight = inner.start_flight();
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = this.guard(flight);
            this.run_refresh(generation, current).await;
        });
    }

    /// Whether `credential`'s session can be renewed by the provider.
    fn can_refresh(&self, credential: &Credential) -> bool {
        credential.has_refresh_token() || self.shared.provider.renews_own_session()
    }

    fn guard(&self, flight: u64) -> FlightGuard {
        FlightGuard {
            manager: self.clone(),
            flight,
        }
    }

    /// Settles a provider call whose task ended without settling it.
    fn abandon_flight(&self, flight: u64) {
        let (waiters, error) = {
            let mut inner = self.shared.inner.lock();
            if inner.flight != flight {
                return;
            }
            match inner.state {
                AuthState::Refreshing => {
                    inner.transition(AuthState::Valid);
                    let error = AuthError::RefreshFailed("refresh did not complete".to_string());
                    (std::mem::take(&mut inner.waiters), error)
                }
                AuthState::Authenticating => {
                    inner.transition(AuthState::SignedOut);
                    inner.credential = None;
                    inner.user = None;
                    (std::mem::take(&mut inner.waiters), AuthError::Unauthenticated)
                }
                _ => return,
            }
        };

        warn!(%error, "provider call ended without settling");
        settle_all(waiters, &Err(error.clone()));
        if let AuthError::RefreshFailed(message) = error {
            self.emit(AuthEvent::RefreshFailed { error: message });
        }
    }

    async fn run_refresh(&self, generation: u64, previous: Credential) {
        debug!(token = %previous.preview(), "refreshing access token");
        let provider = Arc::clone(&self.shared.provider);
        let attempted = self
            .shared
            .retry
            .run(|_| {
                let provider = Arc::clone(&provider);
                let current = previous.clone();
                async move { provider.refresh(&current).await }
            })
            .await;

        match attempted.outcome {
            Ok(grant) => {
                let credential =
                    Credential::from_grant(&grant, self.shared.clock.now(), Some(&previous));
                match credential.validate(self.shared.config.token_format) {
                    Ok(()) => self.refresh_succeeded(generation, credential).await,
                    Err(error) => self.refresh_failed(generation, error.into()),
                }
            }
            Err(ProviderError::RefreshRejected(message) | ProviderError::InvalidCredentials(message)) => {
                self.refresh_rejected(generation, message).await;
            }
            Err(error) => {
                let message = if attempted.exhausted {
                    format!("{error} (after {} attempts)", attempted.attempts)
                } else {
                    error.to_string()
                };
                self.refresh_failed(generation, AuthError::RefreshFailed(message));
            }
        }
    }

    async fn refresh_succeeded(&self, generation: u64, credential: Credential) {
        let waiters = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                debug!("discarding refresh that finished after the session ended");
                return;
            }
            inner.transition(AuthState::Valid);
            inner.credential = Some(credential.clone());
            std::mem::take(&mut inner.waiters)
        };

        info!(token = %credential.preview(), "access token refreshed");
        settle_all(waiters, &Ok(credential.clone()));
        self.emit(AuthEvent::Refreshed {
            token_preview: credential.preview(),
        });

        if let Err(error) = self.persist(generation, Some(&credential), None).await {
            warn!(%error, "could not persist refreshed credential");
        }
        self.schedule_background(generation, &credential);
    }

    async fn refresh_rejected(&self, generation: u64, message: String) {
        let waiters = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.transition(AuthState::Invalid);
            std::mem::take(&mut inner.waiters)
        };

        warn!(%message, "refresh token rejected, ending session");
        let error = AuthError::RefreshRejected(message);
        if let Err(storage) = self
            .end_session_with(SessionEndReason::RefreshRejected, Some(generation), &error)
            .await
        {
            warn!(%storage, "could not clear persisted session");
        }
        settle_all(waiters, &Err(error));
    }

    fn refresh_failed(&self, generation: u64, error: AuthError) {
        let waiters = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.transition(AuthState::Valid);
            std::mem::take(&mut inner.waiters)
        };

        warn!(%error, "token refresh failed, keeping current credential");
        settle_all(waiters, &Err(error.clone()));
        self.emit(AuthEvent::RefreshFailed {
            error: error.to_string(),
        });
        self.schedule_background_in(generation, self.shared.retry.policy().max_delay);
    }

    async fn run_sign_in(
        &self,
        generation: u64,
        credentials: SignInCredentials,
        had_session: bool,
    ) -> Result<Credential, AuthError> {
        info!(identifier = %credentials.identifier, "signing in");
        let outcome = match self.shared.provider.sign_in(&credentials).await {
            Ok(grant) => {
                let credential = Credential::from_grant(&grant, self.shared.clock.now(), None);
                credential
                    .validate(self.shared.config.token_format)
                    .map(|()| (credential, grant.user))
                    .map_err(AuthError::from)
            }
            Err(ProviderError::InvalidCredentials(message) | ProviderError::RefreshRejected(message)) => {
                Err(AuthError::InvalidCredentials(message))
            }
            Err(ProviderError::Unavailable(message) | ProviderError::Protocol(message)) => {
                Err(AuthError::ProviderUnavailable(message))
            }
        };

        match outcome {
            Ok((credential, user)) => {
                let waiters = {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation != generation {
                        return Err(AuthError::Cancelled);
                    }
                    inner.transition(AuthState::Valid);
                    inner.credential = Some(credential.clone());
                    inner.user.clone_from(&user);
                    std::mem::take(&mut inner.waiters)
                };

                info!(token = %credential.preview(), "signed in");
                settle_all(waiters, &Ok(credential.clone()));
                if let Err(error) = self.persist(generation, Some(&credential), user.as_ref()).await {
                    warn!(%error, "could not persist session");
                }
                self.emit(AuthEvent::SignedIn { user });
                self.schedule_background(generation, &credential);
                Ok(credential)
            }
            Err(error) => {
                let waiters = {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation != generation {
                        return Err(error);
                    }
                    inner.transition(AuthState::SignedOut);
                    std::mem::take(&mut inner.waiters)
                };

                warn!(%error, "sign-in failed");
                settle_all(waiters, &Err(AuthError::Unauthenticated));
                if had_session {
                    let _guard = self.shared.persist_lock.lock().await;
                    if let Err(storage) = self.shared.store.clear().await {
                        warn!(%storage, "could not clear replaced session");
                    }
                    self.emit(AuthEvent::SessionEnded {
                        reason: SessionEndReason::SignedOut,
                    });
                }
                Err(error)
            }
        }
    }

    async fn run_restore(&self, generation: u64) -> Result<AuthState, AuthError> {
        let loaded = self.shared.store.load_credential().await;
        let credential = match loaded {
            Ok(Some(credential)) => match credential.validate(self.shared.config.token_format) {
                Ok(()) => Some(credential),
                Err(error) => {
                    warn!(%error, "discarding malformed persisted credential");
                    None
                }
            },
            Ok(None) => None,
            Err(StorageError::Serialization(error)) => {
                warn!(%error, "discarding unreadable persisted credential");
                None
            }
            Err(error) => {
                self.abandon_restore(generation);
                return Err(error.into());
            }
        };

        let Some(credential) = credential else {
            if self.abandon_restore(generation) {
                let _guard = self.shared.persist_lock.lock().await;
                self.shared.store.clear().await?;
            }
            return Ok(AuthState::SignedOut);
        };

        let user = self.shared.store.load_user().await.unwrap_or_else(|error| {
            warn!(%error, "ignoring unreadable cached user");
            None
        });

        let waiters = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return Ok(inner.state);
            }
            inner.transition(AuthState::Valid);
            inner.credential = Some(credential.clone());
            inner.user.clone_from(&user);
            std::mem::take(&mut inner.waiters)
        };

        info!(token = %credential.preview(), "restored persisted session");
        settle_all(waiters, &Ok(credential.clone()));
        self.emit(AuthEvent::Restored { user });
        self.schedule_background(generation, &credential);
        Ok(AuthState::Valid)
    }

    /// Returns the manager to `SignedOut` after a restore found nothing usable.
    fn abandon_restore(&self, generation: u64) -> bool {
        let waiters = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.transition(AuthState::SignedOut);
            std::mem::take(&mut inner.waiters)
        };
        settle_all(waiters, &Err(AuthError::Unauthenticated));
        true
    }

    /// Ends the session at most once.
    ///
    /// With `expected` set, only ends the session of that generation.
    async fn end_session_with(
        &self,
        reason: SessionEndReason,
        expected: Option<u64>,
        waiter_error: &AuthError,
    ) -> Result<bool, StorageError> {
        let (waiters, background) = {
            let mut inner = self.shared.inner.lock();
            if expected.is_some_and(|g| g != inner.generation) || inner.state == AuthState::SignedOut {
                return Ok(false);
            }
            inner.transition(AuthState::SignedOut);
            inner.credential = None;
            inner.user = None;
            inner.generation += 1;
            (std::mem::take(&mut inner.waiters), inner.background.take())
        };
        if let Some(task) = background {
            task.abort();
        }

        settle_all(waiters, &Err(waiter_error.clone()));
        let cleared = {
            let _guard = self.shared.persist_lock.lock().await;
            self.shared.store.clear().await
        };

        info!(%reason, "session ended");
        self.emit(AuthEvent::SessionEnded { reason });
        cleared.map(|()| true)
    }

    /// Writes to the store unless the session of `generation` has ended.
    async fn persist(
        &self,
        generation: u64,
        credential: Option<&Credential>,
        user: Option<&UserProfile>,
    ) -> Result<(), StorageError> {
        let _guard = self.shared.persist_lock.lock().await;
        let current = self.shared.inner.lock().generation;
        if current != generation {
            return Ok(());
        }
        if let Some(credential) = credential {
            self.shared.store.save_credential(credential).await?;
        }
        if let Some(user) = user {
            self.shared.store.save_user(user).await?;
        }
        Ok(())
    }

    fn schedule_background(&self, generation: u64, credential: &Credential) {
        if !self.can_refresh(credential) {
            return;
        }
        let stale_at = credential.stale_at(&self.shared.config.freshness);
        let delay = (stale_at - self.shared.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.schedule_background_in(generation, delay);
    }

    fn schedule_background_in(&self, generation: u64, delay: Duration) {
        if !self.shared.config.background_refresh {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                TokenManager { shared }.background_tick(generation);
            }
        });

        let mut inner = self.shared.inner.lock();
        if inner.generation != generation {
            task.abort();
            return;
        }
        debug!(?delay, "background refresh scheduled");
        if let Some(previous) = inner.background.replace(task) {
            previous.abort();
        }
    }

    fn background_tick(&self, generation: u64) {
        let mut inner = self.shared.inner.lock();
        if inner.generation != generation || inner.state != AuthState::Valid {
            return;
        }
        if let Some(current) = inner.credential.clone().filter(|c| self.can_refresh(c)) {
            debug!("background refresh due");
            self.begin_refresh(&mut inner, current);
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }
}
