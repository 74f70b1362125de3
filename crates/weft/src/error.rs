//! Error types for weft

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use wire::{ErrorObject, TransportError};

/// Which side of the wire an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    /// The client produced or detected the failure
    Client,
    /// The server reported the failure
    Server,
}

/// Errors surfaced by weft operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("document is not a JSON object")]
    InvalidDocumentStructure,

    #[error("document carries none of data, errors, meta")]
    TopLevelEntryMissing,

    #[error("document carries both data and errors")]
    TopLevelDataAndErrorsCoexist,

    #[error("invalid resource structure: {0}")]
    InvalidResourceStructure(String),

    #[error("resource object is missing its type")]
    ResourceTypeMissing,

    #[error("resource object is missing its id")]
    ResourceIdMissing,

    #[error("resource type not registered: {0}")]
    ResourceTypeUnregistered(String),

    #[error("network error: status {code}")]
    Network { code: u16 },

    #[error("server error: status {code}")]
    Server { code: u16, errors: Vec<ApiError> },

    #[error("resource not found")]
    ResourceNotFound,

    #[error("no next page available")]
    NextPageNotAvailable,

    #[error("no previous page available")]
    PreviousPageNotAvailable,

    #[error("operation cancelled")]
    Cancelled,

    #[error("query has neither a resource type nor a url")]
    UnroutableQuery,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Which side of the wire this error belongs to
    pub fn domain(&self) -> ErrorDomain {
        match self {
            Error::Network { .. } | Error::Server { .. } => ErrorDomain::Server,
            _ => ErrorDomain::Client,
        }
    }

    /// The HTTP status code, for errors that carry one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Network { code } | Error::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// One error object reported by the server
///
/// The typed rendering of a member of a document's `errors` array.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiError {
    /// Unique identifier for this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Application-specific error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Explanation of this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// JSON pointer to the offending document fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_pointer: Option<String>,
    /// Name of the offending query parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_parameter: Option<String>,
    /// Free-form metadata
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl From<ErrorObject> for ApiError {
    fn from(obj: ErrorObject) -> Self {
        let status = obj.status_code();
        let (source_pointer, source_parameter) = match obj.source {
            Some(source) => (source.pointer, source.parameter),
            None => (None, None),
        };
        Self {
            id: obj.id,
            status,
            code: obj.code,
            title: obj.title,
            detail: obj.detail,
            source_pointer,
            source_parameter,
            meta: obj.meta.unwrap_or_default(),
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_domains() {
        assert_eq!(Error::ResourceNotFound.domain(), ErrorDomain::Client);
        assert_eq!(Error::Cancelled.domain(), ErrorDomain::Client);
        assert_eq!(Error::Network { code: 502 }.domain(), ErrorDomain::Server);
        assert_eq!(
            Error::Server {
                code: 422,
                errors: vec![]
            }
            .domain(),
            ErrorDomain::Server
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Network { code: 503 }.status_code(), Some(503));
        assert_eq!(Error::ResourceNotFound.status_code(), None);
    }

    #[test]
    fn test_api_error_from_wire_object() {
        let obj: ErrorObject = serde_json::from_value(json!({
            "id": "e1",
            "status": "422",
            "code": "invalid_title",
            "title": "Invalid title",
            "detail": "Titles must be non-empty",
            "source": {"pointer": "/data/attributes/title"}
        }))
        .unwrap();

        let err = ApiError::from(obj);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.title.as_deref(), Some("Invalid title"));
        assert_eq!(err.source_pointer.as_deref(), Some("/data/attributes/title"));
        assert_eq!(err.source_parameter, None);
    }
}
