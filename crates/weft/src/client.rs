//! Client facade
//!
//! The public entry points. A [`Client`] owns the frozen schema registry,
//! the router, and a serial operation queue: every call returns immediately
//! to the caller as a future, but transport work runs one operation at a
//! time, in enqueue order.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use wire::Transport;

use crate::collection::ResourceCollection;
use crate::error::{Error, Result};
use crate::format::{KeyFormat, ValueFormatter, ValueFormatterRegistry};
use crate::operation::{Context, DeleteOperation, FetchOperation, SaveOperation};
use crate::query::Query;
use crate::resource::ResourceHandle;
use crate::router::Router;
use crate::schema::{Registry, ResourceSchema};

/// Assembles a [`Client`]
///
/// Schemas and custom value formatters are collected here and frozen when
/// the client is built; nothing registers after the first operation runs.
pub struct ClientBuilder {
    base_url: Url,
    transport: Arc<dyn Transport>,
    key_format: KeyFormat,
    registry: Registry,
    formatters: ValueFormatterRegistry,
}

impl ClientBuilder {
    fn new(base_url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url,
            transport,
            key_format: KeyFormat::default(),
            registry: Registry::new(),
            formatters: ValueFormatterRegistry::new(),
        }
    }

    /// How domain field names appear on the wire
    pub fn key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }

    /// Register a resource schema
    pub fn register(mut self, schema: ResourceSchema) -> Self {
        self.registry.register(schema);
        self
    }

    /// Register a custom value formatter
    pub fn value_formatter(mut self, formatter: Box<dyn ValueFormatter>) -> Self {
        self.formatters.register(formatter);
        self
    }

    /// Freeze the registries and build the client
    pub fn build(self) -> Client {
        let registry = Arc::new(self.registry);
        let router = Router::new(self.base_url, self.key_format, registry.clone());
        Client {
            context: Arc::new(Context::new(
                self.transport,
                registry,
                Arc::new(self.formatters),
                router,
                self.key_format,
            )),
            queue: Mutex::new(()),
        }
    }
}

/// A client for one JSON:API service
pub struct Client {
    context: Arc<Context>,
    queue: Mutex<()>,
}

impl Client {
    /// Start building a client for `base_url` over `transport`
    pub fn builder(base_url: Url, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(base_url, transport)
    }

    /// The operation context, for driving operations directly
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Create a fresh, unsaved instance of a registered type
    pub fn instantiate(&self, type_name: &str) -> Result<ResourceHandle> {
        self.context.registry().instantiate(type_name)
    }

    /// Fetch the resources a query selects
    pub async fn find(&self, query: Query) -> Result<ResourceCollection> {
        let _serial = self.queue.lock().await;
        FetchOperation::new(query).run(&self.context).await
    }

    /// Fetch the first resource a query selects
    pub async fn find_one(&self, query: Query) -> Result<ResourceHandle> {
        let collection = self.find(query).await?;
        collection.first().cloned().ok_or(Error::ResourceNotFound)
    }

    /// Fetch every resource of a type
    pub async fn find_all(&self, type_name: &str) -> Result<ResourceCollection> {
        self.find(Query::for_type(type_name)).await
    }

    /// Fetch a set of resources by id
    pub async fn find_by_ids<I, S>(&self, type_name: &str, ids: I) -> Result<ResourceCollection>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.find(Query::for_ids(type_name, ids)).await
    }

    /// Fetch one resource by id
    pub async fn find_one_by_id(&self, type_name: &str, id: &str) -> Result<ResourceHandle> {
        self.find_one(Query::for_id(type_name, id)).await
    }

    /// Save a resource: POST when unsaved, PATCH plus the relationship
    /// cascade when it already has an id
    pub async fn save(&self, resource: &ResourceHandle) -> Result<()> {
        let _serial = self.queue.lock().await;
        SaveOperation::new(resource.clone()).run(&self.context).await
    }

    /// Delete a resource
    pub async fn delete(&self, resource: &ResourceHandle) -> Result<()> {
        let _serial = self.queue.lock().await;
        DeleteOperation::new(resource.clone())
            .run(&self.context)
            .await
    }

    /// Fetch the next page and append it to the collection in place
    ///
    /// The collection's three URLs are replaced from the new response.
    pub async fn load_next_page(&self, collection: &mut ResourceCollection) -> Result<()> {
        let next = collection
            .next_url()
            .cloned()
            .ok_or(Error::NextPageNotAvailable)?;
        debug!(%next, "loading next page");
        let page = self.find(Query::from_url(next)).await?;

        collection.append_resources(page.resources().to_vec());
        collection.set_urls(
            page.resources_url().cloned(),
            page.next_url().cloned(),
            page.previous_url().cloned(),
        );
        Ok(())
    }

    /// Fetch the previous page and prepend it to the collection in place
    pub async fn load_previous_page(&self, collection: &mut ResourceCollection) -> Result<()> {
        let previous = collection
            .previous_url()
            .cloned()
            .ok_or(Error::PreviousPageNotAvailable)?;
        debug!(%previous, "loading previous page");
        let page = self.find(Query::from_url(previous)).await?;

        collection.prepend_resources(page.resources().to_vec());
        collection.set_urls(
            page.resources_url().cloned(),
            page.next_url().cloned(),
            page.previous_url().cloned(),
        );
        Ok(())
    }

    /// Make sure a resource is loaded, fetching it if it is a stub
    ///
    /// No-ops when `is_loaded`; otherwise fetches with the resource itself
    /// as the mapping target, preferring its own `url` when it has one.
    pub async fn ensure(&self, resource: &ResourceHandle) -> Result<()> {
        self.ensure_with(resource, |query| query).await
    }

    /// Like [`Client::ensure`], with a hook to refine the fetch query
    pub async fn ensure_with<F>(&self, resource: &ResourceHandle, refine: F) -> Result<()>
    where
        F: FnOnce(Query) -> Query,
    {
        if resource.is_loaded() {
            return Ok(());
        }
        let query = refine(Query::for_resource(resource));
        let _serial = self.queue.lock().await;
        FetchOperation::new(query)
            .with_targets(vec![resource.clone()])
            .run(&self.context)
            .await?;
        Ok(())
    }
}
