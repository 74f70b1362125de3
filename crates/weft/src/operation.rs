//! The operation pipeline
//!
//! Operations compose the transport with the (de)serializer. Each one is
//! single-shot: `Ready` until run, `Executing` around its transport calls,
//! `Finished` when it has produced exactly one success or failure.
//! Cancellation is cooperative: a token flipped before the transport call
//! finishes the operation without side effects, one flipped mid-flight lets
//! the transport complete and discards the result. Either way the operation
//! reports `Cancelled`, never a success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use url::Url;
use uuid::Uuid;
use wire::{Method, Transport, TransportResponse};

use crate::collection::ResourceCollection;
use crate::deserialize::Deserializer;
use crate::error::{Error, Result};
use crate::format::{KeyFormat, ValueFormatterRegistry};
use crate::query::Query;
use crate::resource::{ResourceHandle, ToOneValue};
use crate::router::Router;
use crate::schema::{FieldKind, Registry};
use crate::serialize::{SerializeOptions, Serializer};

/// Single-shot operation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Ready,
    Executing,
    Finished,
}

/// Cooperative cancellation handle
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn bail_if_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Shared state every operation runs against
///
/// Holds the transport, the frozen registries, and the router. Built once
/// by the client facade and immutable afterwards.
pub struct Context {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    formatters: Arc<ValueFormatterRegistry>,
    router: Router,
    key_format: KeyFormat,
}

impl Context {
    /// Create an operation context
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        formatters: Arc<ValueFormatterRegistry>,
        router: Router,
        key_format: KeyFormat,
    ) -> Self {
        Self {
            transport,
            registry,
            formatters,
            router,
            key_format,
        }
    }

    /// The schema registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The query router
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub(crate) fn deserializer(&self) -> Deserializer {
        Deserializer::new(
            self.registry.clone(),
            self.formatters.clone(),
            self.key_format,
        )
    }

    pub(crate) fn serializer(&self) -> Serializer {
        Serializer::new(self.formatters.clone(), self.key_format)
    }

    pub(crate) async fn request(
        &self,
        operation: Uuid,
        method: Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse> {
        debug!(%operation, %method, %url, "issuing request");
        let response = self.transport.request(method, url, body).await?;
        debug!(%operation, status = response.status, "response received");
        Ok(response)
    }

    /// Map a `[400, 599]` response to an error, preferring the body's
    /// `errors[]` over the bare status
    pub(crate) fn failure_from_response(&self, status: u16, body: Option<&[u8]>) -> Error {
        if let Some(bytes) = body {
            if let Ok(document) = self.deserializer().deserialize(bytes, &[]) {
                if !document.errors.is_empty() {
                    return Error::Server {
                        code: status,
                        errors: document.errors,
                    };
                }
            }
        }
        Error::Network { code: status }
    }
}

fn is_api_failure(status: u16) -> bool {
    (400..=599).contains(&status)
}

/// GET a query and map the document into a collection
pub struct FetchOperation {
    id: Uuid,
    query: Query,
    targets: Vec<ResourceHandle>,
    state: OperationState,
    token: CancellationToken,
}

impl FetchOperation {
    /// Create a fetch for `query`
    pub fn new(query: Query) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            targets: Vec::new(),
            state: OperationState::default(),
            token: CancellationToken::new(),
        }
    }

    /// Map the response onto caller-provided target instances
    pub fn with_targets(mut self, targets: Vec<ResourceHandle>) -> Self {
        self.targets = targets;
        self
    }

    /// A handle that cancels this operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Run to completion
    pub async fn run(mut self, context: &Context) -> Result<ResourceCollection> {
        self.state = OperationState::Executing;
        let result = self.execute(context).await;
        self.state = OperationState::Finished;
        result
    }

    async fn execute(&mut self, context: &Context) -> Result<ResourceCollection> {
        bail_if_cancelled(&self.token)?;
        let url = context.router().url_for_query(&self.query)?;
        let response = context.request(self.id, Method::Get, &url, None).await?;
        bail_if_cancelled(&self.token)?;

        if is_api_failure(response.status) {
            return Err(context.failure_from_response(response.status, response.body.as_deref()));
        }

        let body = response.body.as_deref().unwrap_or_default();
        let document = context.deserializer().deserialize(body, &self.targets)?;
        if !document.errors.is_empty() {
            let code = document.errors[0].status.unwrap_or(response.status);
            return Err(Error::Server {
                code,
                errors: document.errors,
            });
        }

        let resources_url = document
            .links
            .get("self")
            .cloned()
            .or_else(|| Some(url.clone()));
        let next_url = document.links.get("next").cloned();
        let previous_url = document.links.get("previous").cloned();
        Ok(ResourceCollection::with_resources(
            document.data,
            resources_url,
            next_url,
            previous_url,
        ))
    }
}

/// POST a new resource or PATCH an existing one, then run the cascade
///
/// On success the response document maps back into the saved instance, so
/// server-assigned ids and URLs flow into the object that was saved. For an
/// existing resource the relationship cascade follows the primary write.
pub struct SaveOperation {
    id: Uuid,
    resource: ResourceHandle,
    state: OperationState,
    token: CancellationToken,
}

impl SaveOperation {
    /// Create a save for `resource`
    pub fn new(resource: ResourceHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource,
            state: OperationState::default(),
            token: CancellationToken::new(),
        }
    }

    /// A handle that cancels this operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Run to completion
    pub async fn run(mut self, context: &Context) -> Result<()> {
        self.state = OperationState::Executing;
        let result = self.execute(context).await;
        self.state = OperationState::Finished;
        result
    }

    async fn execute(&mut self, context: &Context) -> Result<()> {
        let creating = self.resource.id().is_none();
        let (method, url, options) = if creating {
            (
                Method::Post,
                context.router().url_for_type(self.resource.type_name())?,
                SerializeOptions::for_create(),
            )
        } else {
            (
                Method::Patch,
                context
                    .router()
                    .url_for_query(&Query::for_resource(&self.resource))?,
                SerializeOptions::default(),
            )
        };

        let body = context
            .serializer()
            .serialize_resource(&self.resource, &options);

        bail_if_cancelled(&self.token)?;
        let response = context
            .request(self.id, method, &url, Some(serde_json::to_vec(&body)?))
            .await?;
        bail_if_cancelled(&self.token)?;

        if is_api_failure(response.status) {
            return Err(context.failure_from_response(response.status, response.body.as_deref()));
        }

        match response.body.as_deref().filter(|bytes| !bytes.is_empty()) {
            Some(bytes) => {
                context
                    .deserializer()
                    .deserialize(bytes, &[self.resource.clone()])?;
            }
            // A 204 acknowledges the write without echoing the resource.
            None => {
                self.resource.set_loaded(true);
                self.resource.clear_dirty();
            }
        }

        if !creating {
            RelationshipOperation::with_token(self.resource.clone(), self.token.clone())
                .run(context)
                .await?;
        }
        Ok(())
    }
}

/// DELETE a resource
pub struct DeleteOperation {
    id: Uuid,
    resource: ResourceHandle,
    state: OperationState,
    token: CancellationToken,
}

impl DeleteOperation {
    /// Create a delete for `resource`
    pub fn new(resource: ResourceHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource,
            state: OperationState::default(),
            token: CancellationToken::new(),
        }
    }

    /// A handle that cancels this operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Run to completion
    pub async fn run(mut self, context: &Context) -> Result<()> {
        self.state = OperationState::Executing;
        let result = self.execute(context).await;
        self.state = OperationState::Finished;
        result
    }

    async fn execute(&mut self, context: &Context) -> Result<()> {
        if self.resource.id().is_none() {
            return Err(Error::ResourceIdMissing);
        }
        let url = context
            .router()
            .url_for_query(&Query::for_resource(&self.resource))?;

        bail_if_cancelled(&self.token)?;
        let response = context.request(self.id, Method::Delete, &url, None).await?;
        bail_if_cancelled(&self.token)?;

        if is_api_failure(response.status) {
            return Err(context.failure_from_response(response.status, response.body.as_deref()));
        }
        Ok(())
    }
}

/// Replay relationship changes against the `/relationships/…` endpoints
///
/// Sub-operations run strictly ordered: every to-one replace, then every
/// to-many add, then every to-many remove. The first failure halts the
/// chain. Deltas clear as each sub-operation succeeds.
pub struct RelationshipOperation {
    id: Uuid,
    resource: ResourceHandle,
    state: OperationState,
    token: CancellationToken,
}

impl RelationshipOperation {
    /// Create a relationship cascade for `resource`
    pub fn new(resource: ResourceHandle) -> Self {
        Self::with_token(resource, CancellationToken::new())
    }

    pub(crate) fn with_token(resource: ResourceHandle, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource,
            state: OperationState::default(),
            token,
        }
    }

    /// A handle that cancels this operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Run to completion
    pub async fn run(mut self, context: &Context) -> Result<()> {
        self.state = OperationState::Executing;
        let result = self.execute(context).await;
        self.state = OperationState::Finished;
        result
    }

    async fn execute(&mut self, context: &Context) -> Result<()> {
        let schema = self.resource.schema().clone();
        let serializer = context.serializer();

        for field in schema.fields() {
            if field.is_read_only() || !matches!(field.kind(), FieldKind::ToOne { .. }) {
                continue;
            }
            let body = match self.resource.to_one(field.name()) {
                // Never disclosed and never set locally: nothing to replace.
                ToOneValue::Undisclosed => continue,
                ToOneValue::Empty => serializer.serialize_to_one_linkage(None),
                ToOneValue::Linked(handle) => {
                    if handle.identifier().is_none() {
                        continue;
                    }
                    serializer.serialize_to_one_linkage(Some(&handle))
                }
            };
            self.mutate(context, Method::Patch, field, body).await?;
        }

        for field in schema.fields() {
            if field.is_read_only() || !matches!(field.kind(), FieldKind::ToMany { .. }) {
                continue;
            }
            let Some(collection) = self.resource.to_many(field.name()) else {
                continue;
            };
            let added = collection.added_resources();
            if added.is_empty() {
                continue;
            }
            let body = serializer.serialize_to_many_linkage(&added);
            self.mutate(context, Method::Post, field, body).await?;
            collection.clear_added();
        }

        for field in schema.fields() {
            if field.is_read_only() || !matches!(field.kind(), FieldKind::ToMany { .. }) {
                continue;
            }
            let Some(collection) = self.resource.to_many(field.name()) else {
                continue;
            };
            let removed = collection.removed_resources();
            if removed.is_empty() {
                continue;
            }
            let body = serializer.serialize_to_many_linkage(&removed);
            self.mutate(context, Method::Delete, field, body).await?;
            collection.clear_removed();
        }

        Ok(())
    }

    async fn mutate(
        &self,
        context: &Context,
        method: Method,
        field: &crate::schema::Field,
        body: serde_json::Value,
    ) -> Result<()> {
        let url = context.router().url_for_relationship(&self.resource, field)?;
        bail_if_cancelled(&self.token)?;
        let response = context
            .request(self.id, method, &url, Some(serde_json::to_vec(&body)?))
            .await?;
        bail_if_cancelled(&self.token)?;

        if is_api_failure(response.status) {
            return Err(context.failure_from_response(response.status, response.body.as_deref()));
        }
        Ok(())
    }
}
