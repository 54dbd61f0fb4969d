//! Identity provider speaking the console backend's JSON protocol.
//!
//! ```text
//! POST {sign_in_path}  {"identifier", "password"}
//!   -> {"success": true, "data": {"token", "refreshToken", "user", "expiresIn"?}}
//! POST {refresh_path}  {"refreshToken"}
//!   -> {"success": true, "data": {"token", "refreshToken"?}}
//! POST {sign_out_path} with Authorization: Bearer <token>
//! ```
//!
//! Token fields are also accepted at the top level and under their OAuth2
//! names (`access_token`, `refresh_token`, `expires_in`).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tollgate_application::ports::{IdentityProvider, ProviderError};
use tollgate_domain::{
    ClientSettings, Credential, IdentitySettings, SignInCredentials, TokenGrant, UserProfile,
    extract_message,
};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(default, alias = "expires_in")]
    expires_in: Option<u64>,
    #[serde(default)]
    user: Option<UserProfile>,
}

impl From<TokenPayload> for TokenGrant {
    fn from(payload: TokenPayload) -> Self {
        Self {
            access_token: payload.token,
            refresh_token: payload.refresh_token,
            expires_in: payload.expires_in,
            user: payload.user,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Call {
    SignIn,
    Refresh,
    SignOut,
}

/// [`IdentityProvider`] over HTTP.
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    base_url: String,
    paths: IdentitySettings,
}

impl HttpIdentityProvider {
    /// Creates a provider rooted at `base_url`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: &str, paths: IdentitySettings) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            paths,
        }
    }

    /// Creates a provider from client settings.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Protocol`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        Ok(Self::new(http_client, &settings.base_url, settings.identity.clone()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post(
        &self,
        call: Call,
        path: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let url = self.url(path);
        debug!(?call, %url, "calling identity provider");

        let mut builder = self.http_client.post(&url).json(body);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let message = extract_message(&bytes, status.as_u16().into());

        if !status.is_success() {
            return Err(classify_failure(call, status, &bytes, message));
        }

        let value: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| ProviderError::Protocol(format!("invalid JSON from {url}: {e}")))?
        };
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(rejection(call, message));
        }
        Ok(value)
    }
}

fn rejection(call: Call, message: String) -> ProviderError {
    match call {
        Call::SignIn => ProviderError::InvalidCredentials(message),
        Call::Refresh => ProviderError::RefreshRejected(message),
        Call::SignOut => ProviderError::Protocol(message),
    }
}

fn classify_failure(call: Call, status: StatusCode, body: &[u8], message: String) -> ProviderError {
    let code = status.as_u16();
    if code == 408 || code == 429 || status.is_server_error() {
        return ProviderError::Unavailable(format!("{code}: {message}"));
    }
    let invalid_grant = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(|e| e == "invalid_grant"))
        .unwrap_or(false);
    if matches!(code, 400 | 401 | 403) || invalid_grant {
        return rejection(call, message);
    }
    ProviderError::Protocol(format!("{code}: {message}"))
}

/// Reads the token payload from `data` or from the top level.
fn parse_grant(mut value: Value) -> Result<TokenGrant, ProviderError> {
    if let Some(data) = value.get_mut("data").filter(|d| d.is_object()) {
        value = data.take();
    }
    serde_json::from_value::<TokenPayload>(value)
        .map(TokenGrant::from)
        .map_err(|e| ProviderError::Protocol(format!("token missing from response: {e}")))
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<TokenGrant, ProviderError> {
        let body = json!({
            "identifier": credentials.identifier,
            "password": credentials.password,
        });
        let value = self
            .post(Call::SignIn, &self.paths.sign_in_path, &body, None)
            .await?;
        parse_grant(value)
    }

    async fn refresh(&self, current: &Credential) -> Result<TokenGrant, ProviderError> {
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            return Err(ProviderError::RefreshRejected("no refresh token".to_string()));
        };
        let body = json!({ "refreshToken": refresh_token });
        let value = self
            .post(Call::Refresh, &self.paths.refresh_path, &body, None)
            .await?;
        parse_grant(value)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        self.post(
            Call::SignOut,
            &self.paths.sign_out_path,
            &json!({}),
            Some(access_token),
        )
        .await
        .map(|_| ())
    }
}
