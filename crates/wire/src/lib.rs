//! Wire-level types for JSON:API clients
//!
//! This crate has no domain knowledge. It defines the transport abstraction
//! the client core drives, the handful of JSON:API wire shapes that look the
//! same on the read and write paths, and a scripted in-memory transport for
//! tests.

pub mod document;
pub mod mock;
pub mod transport;

pub use document::{link_href, ErrorObject, ErrorSource, ResourceIdentifier};
pub use mock::{MockTransport, RecordedRequest};
pub use transport::{Method, Transport, TransportError, TransportResponse};
