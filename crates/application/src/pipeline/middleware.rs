//! The standard middleware.

use async_trait::async_trait;
use tollgate_domain::{ClientError, ErrorKind, RequestSpec, ResponseSpec, StatusCode};
use tracing::{debug, warn};

use super::{CallContext, Middleware, Next};
use crate::auth::{SessionEndReason, TokenManager};
use crate::retry::RetryExecutor;

/// Turns every non-success response into a [`ClientError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeError;

#[async_trait]
impl Middleware for NormalizeError {
    fn name(&self) -> &'static str {
        "normalize_error"
    }

    async fn handle(
        &self,
        request: RequestSpec,
        ctx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ResponseSpec, ClientError> {
        let result = next.run(request, ctx).await;
        let error = match result {
            Ok(response) if response.status.as_u16() < 400 => return Ok(response),
            Ok(response) => {
                let kind = if ctx.exhausted {
                    ErrorKind::Exhausted
                } else {
                    ErrorKind::Http
                };
                ClientError::from_response(kind, &response)
            }
            Err(error) => error,
        };

        if error.is_caller_fixable() {
            debug!(request_id = %ctx.request_id, %error, "request rejected");
        } else {
            warn!(request_id = %ctx.request_id, attempts = ctx.attempts, %error, "request failed");
        }
        Err(error)
    }
}

/// Refreshes and resubmits once when the backend answers 401.
///
/// A second 401 for the same logical request ends the session.
#[derive(Clone)]
pub struct HandleAuthFailure {
    tokens: TokenManager,
}

impl HandleAuthFailure {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Middleware for HandleAuthFailure {
    fn name(&self) -> &'static str {
        "handle_auth_failure"
    }

    async fn handle(
        &self,
        request: RequestSpec,
        ctx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ResponseSpec, ClientError> {
        let response = next.run(request.clone(), ctx).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !ctx.auth_retried {
            ctx.auth_retried = true;
            let rejected = ctx.token.clone().unwrap_or_default();
            debug!(request_id = %ctx.request_id, "401 received, refreshing and resubmitting");
            self.tokens.refresh_after_rejection(&rejected).await?;

            let response = next.run(request, ctx).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            return self.reject(&response, ctx).await;
        }

        self.reject(&response, ctx).await
    }
}

impl HandleAuthFailure {
    async fn reject(
        &self,
        response: &ResponseSpec,
        ctx: &CallContext,
    ) -> Result<ResponseSpec, ClientError> {
        warn!(request_id = %ctx.request_id, "401 after refresh, ending session");
        if let Err(error) = self.tokens.end_session(SessionEndReason::Unauthorized).await {
            warn!(%error, "could not end session cleanly");
        }
        Err(ClientError::from_response(ErrorKind::Unauthenticated, response))
    }
}

/// Attaches the current bearer token.
#[derive(Clone)]
pub struct AttachToken {
    tokens: TokenManager,
}

impl AttachToken {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Middleware for AttachToken {
    fn name(&self) -> &'static str {
        "attach_token"
    }

    async fn handle(
        &self,
        mut request: RequestSpec,
        ctx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ResponseSpec, ClientError> {
        let credential = self.tokens.get_valid_token().await?;
        request.set_authorization(credential.authorization_header());
        ctx.token = Some(credential.access_token);
        next.run(request, ctx).await
    }
}

/// Retries transient failures of the inner chain.
#[derive(Debug, Clone)]
pub struct Retry {
    executor: RetryExecutor,
}

impl Retry {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(executor: RetryExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Middleware for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn handle(
        &self,
        request: RequestSpec,
        ctx: &mut CallContext,
        next: Next<'_>,
    ) -> Result<ResponseSpec, ClientError> {
        let snapshot = ctx.clone();
        let attempted = self
            .executor
            .run(|retry| {
                let request = request.clone();
                let mut ctx = snapshot.clone();
                async move {
                    debug!(request_id = %ctx.request_id, attempt = retry.attempt + 1, "sending");
                    next.run(request, &mut ctx).await
                }
            })
            .await;

        ctx.attempts = attempted.attempts;
        ctx.exhausted = attempted.exhausted;
        match attempted.outcome {
            Err(error) if attempted.exhausted => Err(ClientError {
                kind: ErrorKind::Exhausted,
                message: format!("{} (after {} attempts)", error.message, attempted.attempts),
                ..error
            }),
            outcome => outcome,
        }
    }
}
