//! Authenticated request pipeline.
//!
//! A request passes through an ordered list of [`Middleware`] before it
//! reaches the [`HttpClient`]. Each middleware gets the request, the
//! per-request [`CallContext`] and a [`Next`] handle for the rest of the
//! chain. The standard order, outermost first:
//!
//! ```text
//! NormalizeError -> HandleAuthFailure -> AttachToken -> Retry -> transport
//! ```
//!
//! The token is attached outside the retry loop, so transient retries reuse
//! it and only the auth retry attaches a new one.

mod client;
mod middleware;

use std::sync::Arc;

use async_trait::async_trait;
use tollgate_domain::{ClientError, ErrorKind, RequestSpec, ResponseSpec, RetryPolicy};
use tracing::debug;
use uuid::Uuid;

pub use client::ApiClient;
pub use middleware::{AttachToken, HandleAuthFailure, NormalizeError, Retry};

use crate::auth::TokenManager;
use crate::ports::HttpClient;
use crate::retry::RetryExecutor;

/// State carried by one logical request through the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Identifier of the logical request.
    pub request_id: Uuid,
    /// Set once the request has been resubmitted after a 401.
    pub auth_retried: bool,
    /// Transport attempts made by the latest pass through the retry loop.
    pub attempts: u32,
    /// True if that pass ended on a still-retryable outcome.
    pub exhausted: bool,
    /// Access token attached on the latest pass.
    pub token: Option<String>,
}

impl CallContext {
    /// Creates a fresh context for `request_id`.
    #[must_use]
    pub const fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            auth_retried: false,
            attempts: 0,
            exhausted: false,
            token: None,
        }
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Handles `request`, usually by calling `next.run`.
    async fn handle(
        &self,
        request: RequestSpec,
        ctx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ResponseSpec, ClientError>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    client: &'a dyn HttpClient,
}

impl<'a> Next<'a> {
    /// Runs the remaining middleware, then the transport.
    ///
    /// # Errors
    ///
    /// Whatever the remaining chain returns.
    pub async fn run(
        self,
        request: RequestSpec,
        ctx: &mut CallContext,
    ) -> Result<ResponseSpec, ClientError> {
        match self.middleware.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    middleware: rest,
                    client: self.client,
                };
                head.handle(request, ctx, next).await
            }
            None => self
                .client
                .execute(&request)
                .await
                .map_err(ClientError::from),
        }
    }
}

/// Ordered middleware around a transport.
#[derive(Clone)]
pub struct Pipeline {
    client: Arc<dyn HttpClient>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Creates a pipeline with the given middleware, outermost first.
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self { client, middleware }
    }

    /// The standard authenticated chain.
    #[must_use]
    pub fn standard(client: Arc<dyn HttpClient>, tokens: TokenManager, retry: RetryPolicy) -> Self {
        Self::new(
            client,
            vec![
                Arc::new(NormalizeError),
                Arc::new(HandleAuthFailure::new(tokens.clone())),
                Arc::new(AttachToken::new(tokens)),
                Arc::new(Retry::new(RetryExecutor::new(retry))),
            ],
        )
    }

    /// Names of the middleware, outermost first.
    #[must_use]
    pub fn layers(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Sends one logical request.
    ///
    /// # Errors
    ///
    /// A [`ClientError`] describing why no acceptable response was obtained.
    pub async fn execute(&self, request: RequestSpec) -> Result<ResponseSpec, ClientError> {
        request
            .validate()
            .map_err(|e| ClientError::new(ErrorKind::InvalidRequest, e.to_string()))?;

        let mut ctx = CallContext::new(request.id);
        debug!(request_id = %ctx.request_id, method = %request.method, url = %request.url, "executing request");
        let next = Next {
            middleware: &self.middleware,
            client: self.client.as_ref(),
        };
        next.run(request, &mut ctx).await
    }
}
