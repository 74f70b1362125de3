//! Document deserialization
//!
//! Parses a JSON:API document into pooled resource instances. Primary and
//! included representations are dispensed through a per-call identity pool,
//! so one instance exists per `(type, id)` and linkage stubs fill in as the
//! compound document discloses them. A final resolution pass materializes
//! to-many collections whose linkage is fully present in the pool.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{trace, warn};
use url::Url;
use wire::{link_href, ErrorObject, ResourceIdentifier};

use crate::collection::LinkedResourceCollection;
use crate::error::{ApiError, Error, Result};
use crate::format::{KeyFormat, ValueFormatterRegistry};
use crate::pool::ResourcePool;
use crate::resource::{RelationshipData, ResourceHandle, ToOneValue};
use crate::schema::{Field, FieldKind, Registry};

/// A deserialized JSON:API document
#[derive(Debug, Default)]
pub struct Document {
    /// Primary resources, in server order
    pub data: Vec<ResourceHandle>,
    /// Side-loaded resources from `included`
    pub included: Vec<ResourceHandle>,
    /// Error objects from `errors`
    pub errors: Vec<ApiError>,
    /// Top-level `meta`
    pub meta: Map<String, Value>,
    /// Top-level `links`; `prev` is normalized to `previous`
    pub links: HashMap<String, Url>,
    /// Top-level `jsonapi` member, verbatim
    pub jsonapi: Option<Value>,
}

impl Document {
    /// A top-level link by name
    pub fn link(&self, name: &str) -> Option<&Url> {
        self.links.get(name)
    }
}

/// Parses documents against one schema registry
pub struct Deserializer {
    registry: Arc<Registry>,
    formatters: Arc<ValueFormatterRegistry>,
    key_format: KeyFormat,
}

impl Deserializer {
    /// Create a deserializer
    pub fn new(
        registry: Arc<Registry>,
        formatters: Arc<ValueFormatterRegistry>,
        key_format: KeyFormat,
    ) -> Self {
        Self {
            registry,
            formatters,
            key_format,
        }
    }

    /// Deserialize a document, mapping primary data onto `targets`
    ///
    /// Targets seed the identity pool: a target with an id is matched by
    /// key, one without is matched by position, which is how a create
    /// response flows back into the instance that was saved. Structural
    /// failures abort the whole document; partial results are never
    /// returned.
    pub fn deserialize(&self, bytes: &[u8], targets: &[ResourceHandle]) -> Result<Document> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|_| Error::InvalidDocumentStructure)?;
        let object = value.as_object().ok_or(Error::InvalidDocumentStructure)?;

        if !object.contains_key("data")
            && !object.contains_key("errors")
            && !object.contains_key("meta")
        {
            return Err(Error::TopLevelEntryMissing);
        }
        if object.contains_key("data") && object.contains_key("errors") {
            return Err(Error::TopLevelDataAndErrorsCoexist);
        }

        let mut pool = ResourcePool::new();
        pool.seed(targets);

        let mut data = Vec::new();
        match object.get("data") {
            Some(Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    data.push(self.deserialize_resource(item, &mut pool, Some(index))?);
                }
            }
            Some(item @ Value::Object(_)) => {
                data.push(self.deserialize_resource(item, &mut pool, Some(0))?);
            }
            Some(Value::Null) | None => {}
            Some(_) => return Err(Error::InvalidDocumentStructure),
        }

        let mut included = Vec::new();
        match object.get("included") {
            Some(Value::Array(items)) => {
                for item in items {
                    included.push(self.deserialize_resource(item, &mut pool, None)?);
                }
            }
            Some(_) => return Err(Error::InvalidDocumentStructure),
            None => {}
        }

        let errors = match object.get("errors") {
            Some(value) => {
                let objects: Vec<ErrorObject> = serde_json::from_value(value.clone())
                    .map_err(|_| Error::InvalidDocumentStructure)?;
                objects.into_iter().map(ApiError::from).collect()
            }
            None => Vec::new(),
        };

        let meta = match object.get("meta") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(Error::InvalidDocumentStructure),
            None => Map::new(),
        };

        let links = object.get("links").map(parse_links).unwrap_or_default();
        let jsonapi = object.get("jsonapi").cloned();

        self.resolve_to_many(&pool);

        trace!(
            primary = data.len(),
            included = included.len(),
            errors = errors.len(),
            "document deserialized"
        );
        Ok(Document {
            data,
            included,
            errors,
            meta,
            links,
            jsonapi,
        })
    }

    fn deserialize_resource(
        &self,
        value: &Value,
        pool: &mut ResourcePool,
        index: Option<usize>,
    ) -> Result<ResourceHandle> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidResourceStructure("resource representation is not an object".to_string())
        })?;
        let type_name = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(Error::ResourceTypeMissing)?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or(Error::ResourceIdMissing)?;

        let resource = pool.dispense(&self.registry, type_name, id, index)?;

        if let Some(url) = parse_link(object.get("links"), "self") {
            resource.set_url(url);
        }
        if let Some(Value::Object(meta)) = object.get("meta") {
            resource.set_meta(meta.clone());
        }

        let attributes = object.get("attributes").and_then(Value::as_object);
        let relationships = object.get("relationships").and_then(Value::as_object);

        let schema = resource.schema().clone();
        for field in schema.fields() {
            let wire_key = self.key_format.encode(field.serialized_name());
            match field.kind() {
                FieldKind::Attribute(kind) => {
                    let Some(value) = attributes.and_then(|a| a.get(wire_key.as_str())) else {
                        continue;
                    };
                    // An explicit wire null leaves the slot untouched.
                    if value.is_null() {
                        continue;
                    }
                    match self.formatters.unformat(kind, value) {
                        Ok(typed) => resource.apply_attribute(field.name(), typed),
                        Err(error) => {
                            warn!(field = field.name(), %error, "skipping unformattable attribute")
                        }
                    }
                }
                FieldKind::ToOne { .. } => {
                    if let Some(rel) = relationships.and_then(|r| r.get(wire_key.as_str())) {
                        self.extract_to_one(field, rel, &resource, pool)?;
                    }
                }
                FieldKind::ToMany { .. } => {
                    if let Some(rel) = relationships.and_then(|r| r.get(wire_key.as_str())) {
                        self.extract_to_many(field, rel, &resource)?;
                    }
                }
            }
        }

        resource.set_loaded(true);
        resource.clear_dirty();
        Ok(resource)
    }

    fn extract_to_one(
        &self,
        field: &Field,
        value: &Value,
        resource: &ResourceHandle,
        pool: &mut ResourcePool,
    ) -> Result<()> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidResourceStructure(format!(
                "relationship {} is not an object",
                field.name()
            ))
        })?;
        let links = object.get("links");
        let self_url = parse_link(links, "self");
        let related_url = parse_link(links, "related");

        let mut linkage = None;
        let mut incoming = None;
        match object.get("data") {
            None => {}
            Some(Value::Null) => {
                linkage = Some(Vec::new());
                incoming = Some(ToOneValue::Empty);
            }
            Some(data @ Value::Object(_)) => {
                let identifier = parse_identifier(data)?;
                let stub =
                    pool.dispense(&self.registry, &identifier.type_name, &identifier.id, None)?;
                if stub.url().is_none() {
                    if let Some(related) = &related_url {
                        stub.set_url(related.clone());
                    }
                }
                linkage = Some(vec![identifier]);
                incoming = Some(ToOneValue::Linked(stub));
            }
            Some(_) => {
                return Err(Error::InvalidResourceStructure(format!(
                    "relationship {} data is neither null nor an object",
                    field.name()
                )))
            }
        }

        resource.set_relationship(
            field.name(),
            RelationshipData {
                self_url,
                related_url,
                linkage,
            },
        );

        // A loaded in-memory object is never clobbered by a stub.
        if let Some(incoming) = incoming {
            let assign = match resource.to_one(field.name()) {
                ToOneValue::Undisclosed | ToOneValue::Empty => true,
                ToOneValue::Linked(current) => !current.is_loaded(),
            };
            if assign {
                resource.set_to_one(field.name(), incoming);
            }
        }
        Ok(())
    }

    fn extract_to_many(
        &self,
        field: &Field,
        value: &Value,
        resource: &ResourceHandle,
    ) -> Result<()> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidResourceStructure(format!(
                "relationship {} is not an object",
                field.name()
            ))
        })?;
        let links = object.get("links");
        let self_url = parse_link(links, "self");
        let related_url = parse_link(links, "related");

        let linkage = match object.get("data") {
            None => None,
            Some(Value::Array(items)) => {
                let mut identifiers = Vec::with_capacity(items.len());
                for item in items {
                    identifiers.push(parse_identifier(item)?);
                }
                Some(identifiers)
            }
            Some(_) => {
                return Err(Error::InvalidResourceStructure(format!(
                    "relationship {} data is not an array",
                    field.name()
                )))
            }
        };

        resource.set_relationship(
            field.name(),
            RelationshipData {
                self_url: self_url.clone(),
                related_url: related_url.clone(),
                linkage: linkage.clone(),
            },
        );

        if linkage.is_some() || resource.to_many(field.name()).is_none() {
            resource.set_to_many(
                field.name(),
                Arc::new(LinkedResourceCollection::new(related_url, self_url, linkage)),
            );
        }
        Ok(())
    }

    /// Materialize every to-many collection whose linkage is fully pooled
    fn resolve_to_many(&self, pool: &ResourcePool) {
        for resource in pool.resources() {
            let schema = resource.schema().clone();
            for field in schema.fields() {
                if !matches!(field.kind(), FieldKind::ToMany { .. }) {
                    continue;
                }
                let Some(collection) = resource.to_many(field.name()) else {
                    continue;
                };
                if collection.is_loaded() {
                    continue;
                }
                let Some(linkage) = collection.linkage() else {
                    continue;
                };

                let mut resolved = Vec::with_capacity(linkage.len());
                let mut complete = true;
                for identifier in &linkage {
                    match pool.lookup(&identifier.type_name, &identifier.id) {
                        Some(handle) => resolved.push(handle.clone()),
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete {
                    collection.set_resolved(resolved);
                }
            }
        }
    }
}

fn parse_identifier(value: &Value) -> Result<ResourceIdentifier> {
    let object = value.as_object().ok_or_else(|| {
        Error::InvalidResourceStructure("linkage entry is not an object".to_string())
    })?;
    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Error::ResourceTypeMissing)?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or(Error::ResourceIdMissing)?;
    Ok(ResourceIdentifier::new(type_name, id))
}

fn parse_link(links: Option<&Value>, name: &str) -> Option<Url> {
    let href = links?.get(name).and_then(link_href)?;
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(error) => {
            warn!(link = name, %error, "skipping unparsable link");
            None
        }
    }
}

fn parse_links(value: &Value) -> HashMap<String, Url> {
    let mut links = HashMap::new();
    if let Value::Object(object) = value {
        for (name, value) in object {
            let Some(href) = link_href(value) else { continue };
            match Url::parse(href) {
                Ok(url) => {
                    let name = if name == "prev" { "previous" } else { name };
                    links.insert(name.to_string(), url);
                }
                Err(error) => warn!(link = %name, %error, "skipping unparsable top-level link"),
            }
        }
    }
    links
}
