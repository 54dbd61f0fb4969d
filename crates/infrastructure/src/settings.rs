//! Settings loader.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML or JSON file
//! 3. `TOLLGATE__*` environment variables, `__` separating nested keys,
//!    e.g. `TOLLGATE__RETRY__MAX_RETRIES=5`

use std::path::Path;

use config::{Config, Environment, File, Map};
use thiserror::Error;
use tollgate_domain::{ClientSettings, DomainError};
use tracing::debug;

const ENV_PREFIX: &str = "TOLLGATE";
const ENV_SEPARATOR: &str = "__";

/// Settings loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or parsed.
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged settings are unusable.
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Loads and validates client settings.
///
/// A `path` that is given must exist.
///
/// # Errors
///
/// [`ConfigError::Load`] if a source is unreadable, [`ConfigError::Invalid`]
/// if the result does not validate.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings, ConfigError> {
    load_with_env(path, None)
}

fn load_with_env(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<ClientSettings, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        debug!(path = %path.display(), "reading settings file");
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("retry.retryable_statuses")
            .source(env),
    );

    let settings: ClientSettings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tollgate_domain::TokenFormat;

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = load_with_env(None, env(&[])).unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn test_file_then_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tollgate.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://admin.example.com/api"

[auth]
token_format = "opaque"

[retry]
max_retries = 1
"#,
        )
        .unwrap();

        let settings = load_with_env(
            Some(&path),
            env(&[
                ("TOLLGATE__RETRY__MAX_RETRIES", "5"),
                ("TOLLGATE__RETRY__RETRYABLE_STATUSES", "502,503"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.base_url, "https://admin.example.com/api");
        assert_eq!(settings.auth.token_format, TokenFormat::Opaque);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.retryable_statuses, vec![502, 503]);
        assert_eq!(settings.timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = load_with_env(None, env(&[("TOLLGATE__BASE_URL", "ftp://nope")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_with_env(Some(Path::new("/nonexistent/tollgate.toml")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
