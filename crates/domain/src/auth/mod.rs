//! Authentication domain types

mod credential;
mod types;

pub use credential::{Credential, FreshnessPolicy, TokenClaims, TokenFormat, token_preview};
pub use types::{SignInCredentials, TokenGrant, UserProfile};
