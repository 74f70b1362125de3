//! Declarative resource schemas
//!
//! A resource type is a string (plural, e.g. `"articles"`) bound to an
//! ordered list of field descriptors. Schemas are class-level: instances
//! hold state only, and share their schema through an `Arc`. The registry
//! is assembled at client construction and immutable afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceHandle};

/// How an attribute's wire value maps to a typed slot
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Opaque JSON value, passed through untouched
    Plain,
    /// Coerced to a boolean
    Boolean,
    /// Parsed as a date; `format` is a chrono format string, ISO-8601 with
    /// milliseconds when absent
    Date { format: Option<String> },
    /// Parsed as a URL, resolved against `base` when relative
    Url { base: Option<Url> },
}

/// What a field descriptor describes
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A scalar attribute
    Attribute(AttributeKind),
    /// Exactly one related resource, or none
    ToOne { related_type: String },
    /// A homogeneous collection of related resources
    ToMany { related_type: String },
}

/// One field of a resource type
///
/// `name` is the domain identifier; the wire identifier defaults to `name`
/// and can be overridden with [`Field::serialize_as`]. Read-only fields are
/// extracted from responses but never written.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    serialized_name: Option<String>,
    read_only: bool,
    kind: FieldKind,
}

impl Field {
    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            serialized_name: None,
            read_only: false,
            kind,
        }
    }

    /// A plain attribute
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Attribute(AttributeKind::Plain))
    }

    /// A boolean attribute
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Attribute(AttributeKind::Boolean))
    }

    /// A date attribute using the default ISO-8601 format
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Attribute(AttributeKind::Date { format: None }))
    }

    /// A date attribute using a custom chrono format string
    pub fn date_with_format(name: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Attribute(AttributeKind::Date {
                format: Some(format.into()),
            }),
        )
    }

    /// A URL attribute accepting absolute URLs only
    pub fn url(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Attribute(AttributeKind::Url { base: None }))
    }

    /// A URL attribute resolving relative values against `base`
    pub fn url_with_base(name: impl Into<String>, base: Url) -> Self {
        Self::new(
            name,
            FieldKind::Attribute(AttributeKind::Url { base: Some(base) }),
        )
    }

    /// A to-one relationship to `related_type`
    pub fn to_one(name: impl Into<String>, related_type: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ToOne {
                related_type: related_type.into(),
            },
        )
    }

    /// A to-many relationship to `related_type`
    pub fn to_many(name: impl Into<String>, related_type: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::ToMany {
                related_type: related_type.into(),
            },
        )
    }

    /// Override the wire identifier
    pub fn serialize_as(mut self, wire_name: impl Into<String>) -> Self {
        self.serialized_name = Some(wire_name.into());
        self
    }

    /// Exclude this field from writes
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Domain identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wire identifier before key formatting; defaults to the domain name
    pub fn serialized_name(&self) -> &str {
        self.serialized_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether this field is excluded from writes
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The field's kind
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether this field is a relationship
    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, FieldKind::ToOne { .. } | FieldKind::ToMany { .. })
    }
}

/// The ordered field list of one resource type
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    type_name: String,
    fields: Vec<Field>,
}

impl ResourceSchema {
    /// Create a schema for `type_name` with the given fields
    pub fn new(type_name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// The resource type string
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The fields, in declaration order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by domain name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// Registry of resource schemas, keyed by type string
///
/// Populated through the client builder and frozen before the first
/// operation runs.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: HashMap<String, Arc<ResourceSchema>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its type string
    ///
    /// Registering the same type twice replaces the earlier schema.
    pub fn register(&mut self, schema: ResourceSchema) {
        self.schemas
            .insert(schema.type_name().to_string(), Arc::new(schema));
    }

    /// Whether `type_name` is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.contains_key(type_name)
    }

    /// The schema for `type_name`
    pub fn get(&self, type_name: &str) -> Result<Arc<ResourceSchema>> {
        self.schemas
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::ResourceTypeUnregistered(type_name.to_string()))
    }

    /// Create a fresh, empty instance of `type_name`
    pub fn instantiate(&self, type_name: &str) -> Result<ResourceHandle> {
        Ok(Resource::new(self.get(type_name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_schema() -> ResourceSchema {
        ResourceSchema::new(
            "articles",
            vec![
                Field::attribute("title"),
                Field::boolean("published"),
                Field::date("created_at").read_only(),
                Field::to_one("author", "people").serialize_as("writer"),
                Field::to_many("comments", "comments"),
            ],
        )
    }

    #[test]
    fn test_field_wire_name_defaults_to_name() {
        let schema = article_schema();
        assert_eq!(schema.field("title").unwrap().serialized_name(), "title");
        assert_eq!(schema.field("author").unwrap().serialized_name(), "writer");
    }

    #[test]
    fn test_read_only_flag() {
        let schema = article_schema();
        assert!(schema.field("created_at").unwrap().is_read_only());
        assert!(!schema.field("title").unwrap().is_read_only());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = Registry::new();
        registry.register(article_schema());

        assert!(registry.contains("articles"));
        assert!(registry.get("articles").is_ok());
        match registry.get("unknown") {
            Err(Error::ResourceTypeUnregistered(name)) => assert_eq!(name, "unknown"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_instantiate_produces_empty_resource() {
        let mut registry = Registry::new();
        registry.register(article_schema());

        let resource = registry.instantiate("articles").unwrap();
        assert_eq!(resource.type_name(), "articles");
        assert_eq!(resource.id(), None);
        assert!(!resource.is_loaded());
    }
}
