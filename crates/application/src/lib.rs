//! Tollgate Application - authenticated HTTP client core
//!
//! This crate contains the services that keep a session authenticated:
//! - The token manager and its credential store
//! - The request pipeline and its middleware
//! - The retry executor
//! - The session controller
//! - Port definitions (traits) for infrastructure adapters

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;

pub use auth::{
    AuthEvent, CredentialStore, SessionEndReason, TokenManager, TokenManagerConfig, TokenStatus,
};
pub use error::{AuthError, StorageError};
pub use pipeline::{ApiClient, CallContext, Middleware, Next, Pipeline};
pub use retry::RetryExecutor;
pub use session::{SessionController, SessionStatus};
