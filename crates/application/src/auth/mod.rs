//! Session authentication.
//!
//! - [`TokenManager`] owns the credential and its state machine
//! - [`CredentialStore`] persists it between runs
//! - [`AuthEvent`] tells the presentation layer what happened

mod credential_store;
mod events;
mod status;
mod token_manager;

pub use credential_store::CredentialStore;
pub use events::{AuthEvent, SessionEndReason};
pub use status::TokenStatus;
pub use token_manager::{TokenManager, TokenManagerConfig};
