//! Tollgate Infrastructure - Adapters and implementations
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the settings loader and the wiring that assembles a client.

pub mod adapters;
pub mod auth;
pub mod settings;
pub mod persistence;
pub mod serialization;
pub mod wiring;

pub use adapters::{ReqwestHttpClient, SystemClock};
pub use auth::HttpIdentityProvider;
pub use settings::{ConfigError, load_settings};
pub use persistence::{FileKeyValueStore, MemoryKeyValueStore};
pub use serialization::{
    SerializationError, from_json, from_json_bytes, to_json_stable, to_json_stable_bytes,
};
pub use wiring::{Client, WiringError, build_client, build_client_with_store};
