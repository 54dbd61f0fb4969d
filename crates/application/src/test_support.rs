//! Hand-written port doubles shared by the unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tollgate_domain::{
    Credential, RequestSpec, ResponseSpec, RetryPolicy, SignInCredentials, TokenGrant, UserProfile,
};

use crate::auth::{CredentialStore, TokenManager, TokenManagerConfig};
use crate::error::StorageError;
use crate::ports::{Clock, HttpClient, HttpClientError, IdentityProvider, KeyValueStore, ProviderError};

/// Fixed starting instant for tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// In-memory store counting how often the credential was cleared.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    clears: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if key == "credential" {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Access token with three non-empty segments.
pub fn token(n: usize) -> String {
    format!("eyJhbGciOiJIUzI1NiJ9.access-{n}.sig")
}

/// Identity provider answering from queues.
///
/// When a queue is empty, sign-in and refresh succeed with a new numbered
/// token that carries a refresh token and a one hour lifetime.
#[derive(Default)]
pub struct ScriptedProvider {
    sign_in_results: Mutex<VecDeque<Result<TokenGrant, ProviderError>>>,
    refresh_results: Mutex<VecDeque<Result<TokenGrant, ProviderError>>>,
    refresh_delay: Mutex<Duration>,
    sign_in_delay: Mutex<Duration>,
    renews_session: AtomicBool,
    panics: AtomicBool,
    refreshed_with: Mutex<Vec<Credential>>,
    issued: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn push_sign_in(&self, result: Result<TokenGrant, ProviderError>) {
        self.sign_in_results.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: Result<TokenGrant, ProviderError>) {
        self.refresh_results.lock().push_back(result);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    pub fn set_sign_in_delay(&self, delay: Duration) {
        *self.sign_in_delay.lock() = delay;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Behave like a provider that renews its own session.
    pub fn set_renews_session(&self, renews: bool) {
        self.renews_session.store(renews, Ordering::SeqCst);
    }

    /// Make every following call panic inside the provider.
    pub fn set_panics(&self, panics: bool) {
        self.panics.store(panics, Ordering::SeqCst);
    }

    /// Credentials passed to `refresh`, oldest first.
    pub fn refreshed_with(&self) -> Vec<Credential> {
        self.refreshed_with.lock().clone()
    }

    fn maybe_panic(&self) {
        if self.panics.load(Ordering::SeqCst) {
            panic!("scripted provider failure");
        }
    }

    fn next_grant(&self) -> TokenGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGrant::new(token(n))
            .with_refresh_token(format!("refresh-{n}"))
            .with_expires_in(3600)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn sign_in(&self, _credentials: &SignInCredentials) -> Result<TokenGrant, ProviderError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.sign_in_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.maybe_panic();
        let scripted = self.sign_in_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.next_grant().with_user(UserProfile::new("u-1"))))
    }

    async fn refresh(&self, current: &Credential) -> Result<TokenGrant, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with.lock().push(current.clone());
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.maybe_panic();
        let scripted = self.refresh_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.next_grant()))
    }

    fn renews_own_session(&self) -> bool {
        self.renews_session.load(Ordering::SeqCst)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), ProviderError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type Responder = dyn Fn(&RequestSpec) -> Result<ResponseSpec, HttpClientError> + Send + Sync;

/// Transport answering through a closure and recording every request.
pub struct ScriptedHttpClient {
    responder: Box<Responder>,
    sent: Mutex<Vec<RequestSpec>>,
}

impl ScriptedHttpClient {
    pub fn new(
        responder: impl Fn(&RequestSpec) -> Result<ResponseSpec, HttpClientError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `status`.
    pub fn always(status: u16) -> Self {
        Self::new(move |_| Ok(ResponseSpec::with_status(status)))
    }

    /// Answers 401 unless the request carries `Bearer <token(n)>` for `n >= min`.
    pub fn accepting_from(min: usize) -> Self {
        Self::new(move |request| {
            let accepted = (min..min + 100).any(|n| {
                request.authorization() == Some(format!("Bearer {}", token(n)).as_str())
            });
            if accepted {
                Ok(ResponseSpec::json(200, &serde_json::json!({"ok": true})))
            } else {
                Ok(ResponseSpec::json(401, &serde_json::json!({"message": "Token expired"})))
            }
        })
    }

    pub fn sent(&self) -> Vec<RequestSpec> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: &RequestSpec) -> Result<ResponseSpec, HttpClientError> {
        self.sent.lock().push(request.clone());
        (self.responder)(request)
    }
}

/// A token manager over doubles, with background refresh off.
pub struct Harness {
    pub manager: TokenManager,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(TokenManagerConfig {
            background_refresh: false,
            ..TokenManagerConfig::default()
        })
    }

    pub fn with_config(config: TokenManagerConfig) -> Self {
        let provider = Arc::new(ScriptedProvider::default());
        let store = Arc::new(MemoryStore::default());
        let clock = Arc::new(ManualClock::at(t0()));
        let manager = TokenManager::new(
            provider.clone(),
            CredentialStore::new(store.clone()),
            clock.clone(),
            config,
        );
        Self {
            manager,
            provider,
            store,
            clock,
        }
    }

    /// Retry policy with short delays for refresh tests.
    pub fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        }
    }

    pub async fn signed_in(self) -> Self {
        self.manager
            .sign_in(SignInCredentials::new("admin", "secret"))
            .await
            .unwrap();
        self
    }
}
