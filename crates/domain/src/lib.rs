//! Tollgate Domain - core types
//!
//! Credentials and their freshness rules, the authentication state machine,
//! request and response values, retry arithmetic, the normalized client
//! error and the client settings. No I/O happens in this crate.

pub mod auth;
pub mod error;
pub mod failure;
pub mod request;
pub mod response;
pub mod retry;
pub mod settings;
pub mod state;

pub use auth::{
    Credential, FreshnessPolicy, SignInCredentials, TokenClaims, TokenFormat, TokenGrant,
    UserProfile, token_preview,
};
pub use error::{DomainError, DomainResult};
pub use failure::{ClientError, ErrorClass, ErrorKind, extract_message};
pub use request::{Header, Headers, HttpMethod, RequestBody, RequestSpec};
pub use response::{ResponseSpec, StatusCode};
pub use retry::RetryPolicy;
pub use settings::{AuthSettings, ClientSettings, IdentitySettings, RetrySettings, StorageSettings};
pub use state::AuthState;
