//! Typed facade over the pipeline.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tollgate_domain::{ClientError, ErrorKind, HttpMethod, RequestBody, RequestSpec, ResponseSpec};
use url::Url;

use super::Pipeline;

/// Sends JSON requests relative to a base URL.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Pipeline,
    base_url: Url,
}

impl ApiClient {
    /// Creates a client rooted at `base_url`.
    #[must_use]
    pub const fn new(pipeline: Pipeline, base_url: Url) -> Self {
        Self { pipeline, base_url }
    }

    /// The base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    ///
    /// Absolute URLs pass through. When the base already ends in `/api`, a
    /// leading `/api/` on `path` is dropped.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let mut path = path.trim_start_matches('/');
        if base.ends_with("/api") {
            if let Some(rest) = path.strip_prefix("api/") {
                path = rest;
            }
        }
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    /// GET `path`, decoding the JSON response.
    ///
    /// # Errors
    ///
    /// Any pipeline [`ClientError`], or [`ErrorKind::Decode`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.call(HttpMethod::Get, path, None).await
    }

    /// GET `path` with `query` encoded into the URL.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`], or [`ErrorKind::InvalidRequest`] if `query`
    /// cannot be encoded.
    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(query)
            .map_err(|e| ClientError::new(ErrorKind::InvalidRequest, e.to_string()))?;
        let url = if encoded.is_empty() {
            path.to_string()
        } else {
            let sep = if path.contains('?') { '&' } else { '?' };
            format!("{path}{sep}{encoded}")
        };
        self.call(HttpMethod::Get, &url, None).await
    }

    /// POST `body` as JSON.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(HttpMethod::Post, path, Some(json_body(body)?)).await
    }

    /// PUT `body` as JSON.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(HttpMethod::Put, path, Some(json_body(body)?)).await
    }

    /// PATCH `body` as JSON.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(HttpMethod::Patch, path, Some(json_body(body)?)).await
    }

    /// DELETE `path`.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.call(HttpMethod::Delete, path, None).await
    }

    /// Sends a prepared request and returns the raw response.
    ///
    /// # Errors
    ///
    /// Any pipeline [`ClientError`].
    pub async fn send(&self, request: RequestSpec) -> Result<ResponseSpec, ClientError> {
        self.pipeline.execute(request).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<T, ClientError> {
        let mut request = RequestSpec::new(method, self.url_for(path))
            .with_header("Accept", "application/json");
        if let Some(body) = body {
            if let Some(content_type) = &body.content_type {
                request.headers.set("Content-Type", content_type.clone());
            }
            request.body = body;
        }
        let response = self.pipeline.execute(request).await?;
        decode(&response)
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ClientError> {
    RequestBody::from_json(body).map_err(|e| ClientError::new(ErrorKind::InvalidRequest, e.to_string()))
}

/// Decodes a JSON response body; an empty body reads as `null`.
fn decode<T: DeserializeOwned>(response: &ResponseSpec) -> Result<T, ClientError> {
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|e| {
        ClientError::new(ErrorKind::Decode, format!("could not decode response: {e}"))
            .with_status(response.status.as_u16())
    })
}
