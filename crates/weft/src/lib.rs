//! Weft - a typed client for JSON:API services
//!
//! Weft maps JSON:API documents onto typed in-memory resource graphs and
//! back. Application code declares resource schemas, issues structured
//! queries, and works with graphs whose relationships load lazily; weft owns
//! the wire mapping, the identity pool that keeps one instance per
//! `(type, id)` within a deserialization, the query-to-URL router, and the
//! operation pipeline that sequences a save with the per-relationship
//! mutations JSON:API requires.
//!
//! The network itself stays behind the pluggable [`wire::Transport`] trait.

pub mod client;
pub mod collection;
pub mod deserialize;
pub mod error;
pub mod format;
pub mod operation;
pub mod pool;
pub mod query;
pub mod resource;
pub mod router;
pub mod schema;
pub mod serialize;

pub use client::{Client, ClientBuilder};
pub use collection::{LinkedResourceCollection, ResourceCollection};
pub use deserialize::{Deserializer, Document};
pub use error::{ApiError, Error, ErrorDomain, Result};
pub use format::{KeyFormat, ValueFormatter, ValueFormatterRegistry};
pub use operation::{
    CancellationToken, Context, DeleteOperation, FetchOperation, OperationState,
    RelationshipOperation, SaveOperation,
};
pub use pool::ResourcePool;
pub use query::{Comparison, Pagination, Predicate, Query, SortDescriptor};
pub use resource::{
    AttributeValue, RelationshipData, Resource, ResourceHandle, ToOneValue,
};
pub use router::Router;
pub use schema::{AttributeKind, Field, FieldKind, Registry, ResourceSchema};
pub use serialize::{SerializeOptions, Serializer};
pub use wire::{Method, ResourceIdentifier, Transport, TransportError, TransportResponse};
