//! Outbound request type

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::{Header, Headers, HttpMethod, RequestBody};
use crate::error::{DomainError, DomainResult};

/// Header carrying the bearer credential.
pub const AUTHORIZATION: &str = "Authorization";

/// A single logical HTTP request.
///
/// The `id` is stable across auth retries and transient retries of the same
/// logical request, so it ties their log lines together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Identifier of this logical request.
    pub id: Uuid,
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute target URL
    pub url: String,
    /// HTTP headers
    #[serde(default)]
    pub headers: Headers,
    /// Request body
    #[serde(default)]
    pub body: RequestBody,
    /// Per-request timeout overriding the transport default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            method,
            url: url.into(),
            headers: Headers::new(),
            body: RequestBody::none(),
            timeout: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(Header::new(name, value));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets or replaces the `Authorization` header.
    pub fn set_authorization(&mut self, value: impl Into<String>) {
        self.headers.set(AUTHORIZATION, value);
    }

    /// Returns the `Authorization` header, if set.
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)
    }

    /// Parses the target URL.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidUrl`] if the URL is malformed or not http(s).
    pub fn parse_url(&self) -> DomainResult<Url> {
        let url = Url::parse(&self.url).map_err(|e| DomainError::InvalidUrl(format!("{}: {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(DomainError::InvalidUrl(format!("unsupported scheme {other}"))),
        }
    }

    /// Validates URL, headers and body before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns the first [`DomainError`] found.
    pub fn validate(&self) -> DomainResult<()> {
        self.parse_url()?;
        if !self.body.is_empty() && !self.method.accepts_body() {
            return Err(DomainError::InvalidBody(format!(
                "{} requests cannot carry a body",
                self.method
            )));
        }
        self.headers.iter().try_for_each(Header::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_request() {
        let req = RequestSpec::get("https://api.example.com/users");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_authorization_is_replaced() {
        let mut req = RequestSpec::get("https://api.example.com/users");
        req.set_authorization("Bearer a");
        req.set_authorization("Bearer b");
        assert_eq!(req.authorization(), Some("Bearer b"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_url_and_scheme() {
        assert!(RequestSpec::get("not a url").validate().is_err());
        assert!(RequestSpec::get("ftp://example.com").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_body_on_get() {
        let req = RequestSpec::get("https://api.example.com/users").with_body(RequestBody::text("x"));
        assert!(matches!(req.validate(), Err(DomainError::InvalidBody(_))));

        let req = RequestSpec::post("https://api.example.com/users").with_body(RequestBody::text("x"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(RequestSpec::get("https://a").id, RequestSpec::get("https://a").id);
    }
}
