//! JSON helpers for files Tollgate writes.
//!
//! Output is pretty-printed with 2-space indentation and a trailing newline,
//! so session files stay readable when inspected by hand.

mod json;

pub use json::{SerializationError, from_json, from_json_bytes, to_json_stable, to_json_stable_bytes};
