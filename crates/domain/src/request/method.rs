//! Request verbs issued through the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verb of an outbound API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Read a resource.
    #[default]
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Partial update.
    Patch,
    /// Remove.
    Delete,
    /// Used for reachability checks; never decoded.
    Head,
}

impl HttpMethod {
    /// Whether a request body may be sent with this verb. `GET` and `HEAD`
    /// never carry one.
    #[must_use]
    pub const fn accepts_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }

    /// Wire name, as logged with each request.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_carrying_verbs() {
        assert!(!HttpMethod::Get.accepts_body());
        assert!(!HttpMethod::Head.accepts_body());
        assert!(HttpMethod::Post.accepts_body());
        assert!(HttpMethod::Delete.accepts_body());
    }

    #[test]
    fn test_serialized_as_wire_name() {
        assert_eq!(serde_json::to_string(&HttpMethod::Patch).ok().as_deref(), Some("\"PATCH\""));
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
