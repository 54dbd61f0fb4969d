//! Typed access to the persisted session.

use std::sync::Arc;

use tollgate_domain::{Credential, UserProfile};
use tracing::debug;

use crate::error::StorageError;
use crate::ports::KeyValueStore;

const CREDENTIAL_KEY: &str = "credential";
const USER_KEY: &str = "user";

/// Reads and writes the credential and the cached user profile.
///
/// Only the token manager holds one of these.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Wraps a key-value backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Loads the persisted credential.
    ///
    /// # Errors
    ///
    /// [`StorageError::Serialization`] if the stored value is unreadable,
    /// [`StorageError::Io`] if the backend failed.
    pub async fn load_credential(&self) -> Result<Option<Credential>, StorageError> {
        self.load(CREDENTIAL_KEY).await
    }

    /// Loads the cached user profile.
    ///
    /// # Errors
    ///
    /// As for [`Self::load_credential`].
    pub async fn load_user(&self) -> Result<Option<UserProfile>, StorageError> {
        self.load(USER_KEY).await
    }

    /// Persists the credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write failed.
    pub async fn save_credential(&self, credential: &Credential) -> Result<(), StorageError> {
        self.save(CREDENTIAL_KEY, credential).await
    }

    /// Persists the user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write failed.
    pub async fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        self.save(USER_KEY, user).await
    }

    /// Removes everything this store owns.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure; both keys are attempted.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let credential = self.backend.remove(CREDENTIAL_KEY).await;
        let user = self.backend.remove(USER_KEY).await;
        debug!("persisted session cleared");
        credential.and(user)
    }

    async fn load<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.backend.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn save<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StorageError::Serialization(format!("{key}: {e}")))?;
        self.backend.set(key, raw).await
    }
}
