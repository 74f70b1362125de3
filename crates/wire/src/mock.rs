//! Scripted in-memory transport for tests
//!
//! [`MockTransport`] replays a queue of canned responses and records every
//! request it sees, letting tests assert on the exact sequence of calls the
//! client core makes without touching the network.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::transport::{Method, Transport, TransportError, TransportResponse};

/// One request as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: Method,
    /// Full request URL
    pub url: String,
    /// Request body parsed as JSON, if a body was sent
    pub body: Option<Value>,
}

/// In-memory transport that replays scripted responses
///
/// Responses are consumed in FIFO order, one per request. When the script
/// runs dry the mock fails the request, which keeps a miscounted test from
/// hanging on a response that will never come.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a mock with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with a JSON body
    pub fn queue_response(&self, status: u16, body: Value) {
        let bytes = body.to_string().into_bytes();
        lock(&self.script).push_back(Ok(TransportResponse::with_body(status, bytes)));
    }

    /// Queue a response with no body
    pub fn queue_empty_response(&self, status: u16) {
        lock(&self.script).push_back(Ok(TransportResponse::new(status)));
    }

    /// Queue a transport-level failure
    pub fn queue_error(&self, message: impl Into<String>) {
        lock(&self.script).push_back(Err(TransportError::new(message)));
    }

    /// Every request recorded so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests recorded so far
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse, TransportError> {
        let body = body.as_deref().and_then(|b| serde_json::from_slice(b).ok());
        lock(&self.requests).push(RecordedRequest {
            method,
            url: url.as_str().to_string(),
            body,
        });

        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("mock transport script exhausted")))
    }
}
