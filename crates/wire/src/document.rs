//! JSON:API wire shapes shared by both directions
//!
//! Only the pieces that look identical on the read and write paths live
//! here: resource identifiers, error objects, and the string-or-object link
//! value. Full document mapping belongs to the client core.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `{type, id}` pair identifying a resource
///
/// Sufficient to deduplicate against an identity pool without fetching the
/// resource itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Resource type (plural, e.g. `"articles"`)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource id
    pub id: String,
}

impl ResourceIdentifier {
    /// Create a new identifier
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// An error object from a document's top-level `errors` array
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Unique identifier for this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// HTTP status code; servers send this as either a string or a number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    /// Application-specific error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short, human-readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable explanation of this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Reference to the part of the request that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    /// Free-form metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, Value>>,
}

impl ErrorObject {
    /// The status as a numeric code, whichever wire form the server used
    pub fn status_code(&self) -> Option<u16> {
        match &self.status {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        }
    }
}

/// The `source` member of an error object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorSource {
    /// JSON pointer to the offending document fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Name of the offending query parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Extract the href from a link value
///
/// Link values are either a bare URL string or an object with an `href`
/// member; both forms are accepted everywhere a link appears.
pub fn link_href(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get("href").and_then(Value::as_str),
        _ => None,
    }
}
