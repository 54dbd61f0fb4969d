//! Builds the full client stack from settings.

use std::sync::Arc;

use thiserror::Error;
use tollgate_application::ports::{HttpClientError, KeyValueStore, ProviderError};
use tollgate_application::{
    ApiClient, CredentialStore, Pipeline, SessionController, StorageError, TokenManager,
    TokenManagerConfig,
};
use tollgate_domain::{ClientSettings, DomainError};

use crate::adapters::{ReqwestHttpClient, SystemClock};
use crate::auth::HttpIdentityProvider;
use crate::persistence::FileKeyValueStore;

/// Failures while assembling the stack.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Settings are unusable.
    #[error(transparent)]
    Settings(#[from] DomainError),

    /// The transport could not be built.
    #[error("transport: {0}")]
    Transport(#[from] HttpClientError),

    /// The identity provider could not be built.
    #[error("identity provider: {0}")]
    Provider(#[from] ProviderError),

    /// No session file location is available.
    #[error("session store: {0}")]
    Storage(#[from] StorageError),
}

/// A ready-to-use client.
pub struct Client {
    /// Settings the stack was built from.
    pub settings: ClientSettings,
    /// Session front for the presentation layer.
    pub session: SessionController,
}

impl Client {
    /// The token manager.
    #[must_use]
    pub const fn tokens(&self) -> &TokenManager {
        self.session.tokens()
    }

    /// The authenticated API client.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        self.session.api()
    }
}

/// Builds a client persisting its session to the configured file.
///
/// Must be called inside a tokio runtime. Call
/// [`SessionController::restore`] afterwards to pick up a saved session.
///
/// # Errors
///
/// Any [`WiringError`].
pub fn build_client(settings: ClientSettings) -> Result<Client, WiringError> {
    let store = match &settings.storage.path {
        Some(path) => FileKeyValueStore::new(path.clone()),
        None => FileKeyValueStore::in_config_dir()?,
    };
    build_client_with_store(settings, Arc::new(store))
}

/// Builds a client over an explicit key-value store.
///
/// # Errors
///
/// Any [`WiringError`].
pub fn build_client_with_store(
    settings: ClientSettings,
    store: Arc<dyn KeyValueStore>,
) -> Result<Client, WiringError> {
    settings.validate()?;
    let base_url = settings.base_url()?;
    let retry = settings.retry.policy();

    let provider = Arc::new(HttpIdentityProvider::from_settings(&settings)?);
    let tokens = TokenManager::new(
        provider,
        CredentialStore::new(store),
        Arc::new(SystemClock),
        TokenManagerConfig::from_settings(&settings.auth, retry.clone()),
    );

    let transport = Arc::new(ReqwestHttpClient::from_settings(&settings)?);
    let pipeline = Pipeline::standard(transport, tokens.clone(), retry);
    let api = ApiClient::new(pipeline, base_url);
    let session = SessionController::new(tokens, api, settings.identity.profile_path.clone());

    Ok(Client { settings, session })
}
