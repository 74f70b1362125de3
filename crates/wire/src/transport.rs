//! Pluggable transport abstraction
//!
//! The client core never talks to the network itself. It hands a method, a
//! URL, and an optional body to a [`Transport`] implementation and interprets
//! the status code and bytes that come back.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// HTTP methods the client core issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// The method name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error produced by a transport backend
///
/// Carried through the client core verbatim. The optional code preserves a
/// backend-specific error number for callers that want to inspect it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable description of the failure
    pub message: String,
    /// Backend-specific error code, if the backend has one
    pub code: Option<i64>,
}

impl TransportError {
    /// Create a new transport error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a backend-specific error code
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

/// What came back from a transport request
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, if the server sent one
    pub body: Option<Vec<u8>>,
}

impl TransportResponse {
    /// Create a response with no body
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Create a response carrying a body
    pub fn with_body(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// Whether the status code is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A pluggable HTTP backend
///
/// Implementations run one request to completion. They are not required to
/// support cancellation; the operation layer discards the result of a
/// cancelled request instead. Timeouts are the backend's responsibility.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single request and return the response
    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, TransportError>;
}
