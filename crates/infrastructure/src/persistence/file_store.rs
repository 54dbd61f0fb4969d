//! File-backed key-value store.
//!
//! All keys live in one JSON document:
//! ```json
//! {
//!   "credential": "{\"access_token\":\"...\"}",
//!   "user": "{\"id\":\"...\"}"
//! }
//! ```
//! Writes go to a sibling temp file that is then renamed over the original,
//! so a crash never leaves a half-written session behind.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tollgate_application::StorageError;
use tollgate_application::ports::KeyValueStore;
use tracing::debug;

use crate::serialization::{from_json_bytes, to_json_stable_bytes};

const APP_DIR: &str = "tollgate";
const SESSION_FILE: &str = "session.json";

type Document = BTreeMap<String, String>;

/// Key-value store persisted as a JSON file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the platform config dir, e.g. `~/.config/tollgate/session.json`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the platform has no config directory.
    pub fn in_config_dir() -> Result<Self, StorageError> {
        Self::default_path().map(Self::new)
    }

    /// The default session file path.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf, StorageError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(SESSION_FILE))
            .ok_or_else(|| StorageError::Io("no config directory on this platform".to_string()))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Document, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Ok(bytes) => from_json_bytes(&bytes).map_err(|e| {
                StorageError::Serialization(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn write(&self, document: &Document) -> Result<(), StorageError> {
        if document.is_empty() {
            return match fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(&self.path, &e)),
            };
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        let content =
            to_json_stable_bytes(document).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, &content)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        debug!(path = %self.path.display(), keys = document.len(), "session file written");
        Ok(())
    }
}

fn io_error(path: &Path, error: &io::Error) -> StorageError {
    StorageError::Io(format!("{}: {error}", path.display()))
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        // An unreadable file is replaced rather than blocking new sessions.
        let mut document = self.read().await.unwrap_or_default();
        document.insert(key.to_string(), value);
        self.write(&document).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut document = match self.read().await {
            Ok(document) => document,
            Err(StorageError::Serialization(_)) => Document::new(),
            Err(e) => return Err(e),
        };
        document.remove(key);
        self.write(&document).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileKeyValueStore {
        FileKeyValueStore::new(dir.path().join("nested").join("session.json"))
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).get("credential").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        store(&dir).set("credential", "abc".into()).await.unwrap();
        store(&dir).set("user", "{}".into()).await.unwrap();

        let reopened = store(&dir);
        assert_eq!(reopened.get("credential").await.unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("user").await.unwrap().as_deref(), Some("{}"));
        assert!(!reopened.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_removing_last_key_deletes_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set("credential", "abc".into()).await.unwrap();
        store.remove("credential").await.unwrap();
        store.remove("credential").await.unwrap();

        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(
            store.get("credential").await,
            Err(StorageError::Serialization(_))
        ));

        store.remove("credential").await.unwrap();
        assert_eq!(store.get("credential").await.unwrap(), None);
    }
}
