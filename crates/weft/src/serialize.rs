//! Document serialization
//!
//! Emits resources as JSON:API documents for create and update bodies, and
//! linkage-only bodies for the `/relationships/…` endpoints. Relationship
//! emission is linkage-only by construction: the serializer never recurses
//! into related resources, so cyclic graphs are safe.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use wire::ResourceIdentifier;

use crate::format::{KeyFormat, ValueFormatterRegistry};
use crate::resource::{ResourceHandle, ToOneValue};
use crate::schema::FieldKind;

/// Knobs controlling what a serialized resource carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Emit the resource id when it has one
    pub include_id: bool,
    /// Restrict attributes to fields written since the last save or fetch
    pub dirty_fields_only: bool,
    /// Emit to-one relationships as linkage
    pub include_to_one: bool,
    /// Emit to-many relationships as linkage
    pub include_to_many: bool,
    /// Drop attributes with no value instead of writing wire nulls
    pub omit_null_values: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            include_id: true,
            dirty_fields_only: false,
            include_to_one: false,
            include_to_many: false,
            omit_null_values: false,
        }
    }
}

impl SerializeOptions {
    /// The body of a create: no id yet, relationships inline
    pub fn for_create() -> Self {
        Self {
            include_id: false,
            include_to_one: true,
            include_to_many: true,
            ..Self::default()
        }
    }
}

/// Emits resources as JSON:API documents
pub struct Serializer {
    formatters: Arc<ValueFormatterRegistry>,
    key_format: KeyFormat,
}

impl Serializer {
    /// Create a serializer
    pub fn new(formatters: Arc<ValueFormatterRegistry>, key_format: KeyFormat) -> Self {
        Self {
            formatters,
            key_format,
        }
    }

    /// `{data: <resource object>}`
    pub fn serialize_resource(&self, resource: &ResourceHandle, options: &SerializeOptions) -> Value {
        json!({"data": self.resource_object(resource, options)})
    }

    /// `{data: [<resource objects>]}`
    pub fn serialize_resources(
        &self,
        resources: &[ResourceHandle],
        options: &SerializeOptions,
    ) -> Value {
        let objects: Vec<Value> = resources
            .iter()
            .map(|resource| self.resource_object(resource, options))
            .collect();
        json!({"data": objects})
    }

    /// Linkage-only body for a to-one relationship endpoint
    ///
    /// `None`, or a resource without an id, yields `{data: null}`.
    pub fn serialize_to_one_linkage(&self, resource: Option<&ResourceHandle>) -> Value {
        let data = resource
            .and_then(|r| r.identifier())
            .map(|identifier| identifier_value(&identifier))
            .unwrap_or(Value::Null);
        json!({"data": data})
    }

    /// Linkage-only body for a to-many relationship endpoint
    ///
    /// Resources without ids are filtered out.
    pub fn serialize_to_many_linkage(&self, resources: &[ResourceHandle]) -> Value {
        let identifiers: Vec<Value> = resources
            .iter()
            .filter_map(|resource| resource.identifier())
            .map(|identifier| identifier_value(&identifier))
            .collect();
        json!({"data": identifiers})
    }

    fn resource_object(&self, resource: &ResourceHandle, options: &SerializeOptions) -> Value {
        let mut object = Map::new();
        object.insert(
            "type".to_string(),
            Value::String(resource.type_name().to_string()),
        );
        if options.include_id {
            if let Some(id) = resource.id() {
                object.insert("id".to_string(), Value::String(id));
            }
        }

        let dirty = resource.dirty_fields();
        let mut attributes = Map::new();
        let mut relationships = Map::new();

        let schema = resource.schema().clone();
        for field in schema.fields() {
            if field.is_read_only() {
                continue;
            }
            let wire_key = self.key_format.encode(field.serialized_name());
            match field.kind() {
                FieldKind::Attribute(kind) => {
                    if options.dirty_fields_only && !dirty.contains(field.name()) {
                        continue;
                    }
                    match resource.attribute(field.name()) {
                        Some(value) => {
                            attributes.insert(wire_key, self.formatters.format(kind, &value));
                        }
                        None => {
                            if !options.omit_null_values {
                                attributes.insert(wire_key, Value::Null);
                            }
                        }
                    }
                }
                FieldKind::ToOne { .. } => {
                    if !options.include_to_one {
                        continue;
                    }
                    match resource.to_one(field.name()) {
                        ToOneValue::Undisclosed => {}
                        ToOneValue::Empty => {
                            relationships.insert(wire_key, json!({"data": null}));
                        }
                        ToOneValue::Linked(handle) => {
                            if let Some(identifier) = handle.identifier() {
                                relationships
                                    .insert(wire_key, json!({"data": identifier_value(&identifier)}));
                            }
                        }
                    }
                }
                FieldKind::ToMany { .. } => {
                    if !options.include_to_many {
                        continue;
                    }
                    let Some(collection) = resource.to_many(field.name()) else {
                        continue;
                    };
                    let body = self.serialize_to_many_linkage(&collection.resources());
                    relationships.insert(wire_key, body);
                }
            }
        }

        if !attributes.is_empty() {
            object.insert("attributes".to_string(), Value::Object(attributes));
        }
        if !relationships.is_empty() {
            object.insert("relationships".to_string(), Value::Object(relationships));
        }
        Value::Object(object)
    }
}

fn identifier_value(identifier: &ResourceIdentifier) -> Value {
    json!({"type": identifier.type_name, "id": identifier.id})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::schema::{Field, Registry, ResourceSchema};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(ResourceSchema::new(
            "articles",
            vec![
                Field::attribute("title"),
                Field::boolean("published"),
                Field::attribute("internal_rank").read_only(),
                Field::to_one("author", "people"),
                Field::to_many("comments", "comments"),
            ],
        ));
        registry.register(ResourceSchema::new("people", vec![]));
        registry.register(ResourceSchema::new("comments", vec![]));
        registry
    }

    fn serializer() -> Serializer {
        Serializer::new(
            Arc::new(ValueFormatterRegistry::new()),
            KeyFormat::Dasherized,
        )
    }

    fn article(registry: &Registry) -> ResourceHandle {
        let article = registry.instantiate("articles").unwrap();
        article.set_id("1");
        article.set_attribute("title", "Weaving");
        article.set_attribute("published", true);
        article
    }

    #[test]
    fn test_default_body_carries_id_and_attributes() {
        let registry = registry();
        let resource = article(&registry);

        let body = serializer().serialize_resource(&resource, &SerializeOptions::default());
        assert_eq!(body["data"]["type"], "articles");
        assert_eq!(body["data"]["id"], "1");
        assert_eq!(body["data"]["attributes"]["title"], "Weaving");
        assert_eq!(body["data"]["attributes"]["published"], true);
        // No relationship linkage unless asked for.
        assert!(body["data"].get("relationships").is_none());
    }

    #[test]
    fn test_absent_attribute_writes_null_unless_omitted() {
        let registry = registry();
        let resource = registry.instantiate("articles").unwrap();
        resource.set_attribute("title", "Weaving");

        let body = serializer().serialize_resource(&resource, &SerializeOptions::default());
        assert_eq!(body["data"]["attributes"]["published"], Value::Null);

        let omitting = SerializeOptions {
            omit_null_values: true,
            ..SerializeOptions::default()
        };
        let body = serializer().serialize_resource(&resource, &omitting);
        assert!(body["data"]["attributes"].get("published").is_none());
    }

    #[test]
    fn test_read_only_fields_never_serialize() {
        let registry = registry();
        let resource = article(&registry);
        resource.set_attribute("internal_rank", 5i64);

        let body = serializer().serialize_resource(&resource, &SerializeOptions::default());
        assert!(body["data"]["attributes"].get("internal-rank").is_none());
    }

    #[test]
    fn test_create_body_inlines_relationships_without_id() {
        let registry = registry();
        let resource = registry.instantiate("articles").unwrap();
        resource.set_attribute("title", "Weaving");

        let author = registry.instantiate("people").unwrap();
        author.set_id("10");
        resource.set_to_one("author", crate::resource::ToOneValue::Linked(author));

        let comment = registry.instantiate("comments").unwrap();
        comment.set_id("5");
        resource.to_many_or_empty("comments").add_resource(&comment);

        let body = serializer().serialize_resource(&resource, &SerializeOptions::for_create());
        assert!(body["data"].get("id").is_none());
        assert_eq!(
            body["data"]["relationships"]["author"]["data"],
            serde_json::json!({"type": "people", "id": "10"})
        );
        assert_eq!(
            body["data"]["relationships"]["comments"]["data"],
            serde_json::json!([{"type": "comments", "id": "5"}])
        );
    }

    #[test]
    fn test_to_one_states() {
        let registry = registry();
        let options = SerializeOptions {
            include_to_one: true,
            ..SerializeOptions::default()
        };

        let undisclosed = article(&registry);
        let body = serializer().serialize_resource(&undisclosed, &options);
        assert!(body["data"].get("relationships").is_none());

        let emptied = article(&registry);
        emptied.set_to_one("author", crate::resource::ToOneValue::Empty);
        let body = serializer().serialize_resource(&emptied, &options);
        assert_eq!(body["data"]["relationships"]["author"]["data"], Value::Null);
    }

    #[test]
    fn test_dirty_fields_only() {
        let registry = registry();
        let resource = article(&registry);
        resource.clear_dirty();
        resource.set_attribute("title", "Edited");

        let options = SerializeOptions {
            dirty_fields_only: true,
            ..SerializeOptions::default()
        };
        let body = serializer().serialize_resource(&resource, &options);
        assert_eq!(body["data"]["attributes"]["title"], "Edited");
        assert!(body["data"]["attributes"].get("published").is_none());
    }

    #[test]
    fn test_to_many_linkage_filters_unsaved_resources() {
        let registry = registry();
        let saved = registry.instantiate("comments").unwrap();
        saved.set_id("5");
        let unsaved = registry.instantiate("comments").unwrap();

        let body = serializer().serialize_to_many_linkage(&[saved, unsaved]);
        assert_eq!(
            body,
            serde_json::json!({"data": [{"type": "comments", "id": "5"}]})
        );
    }

    #[test]
    fn test_to_one_linkage_body() {
        let registry = registry();
        let author = registry.instantiate("people").unwrap();
        author.set_id("10");

        let body = serializer().serialize_to_one_linkage(Some(&author));
        assert_eq!(body, serde_json::json!({"data": {"type": "people", "id": "10"}}));

        let cleared = serializer().serialize_to_one_linkage(None);
        assert_eq!(cleared, serde_json::json!({"data": null}));
    }

    #[test]
    fn test_multiple_resources_serialize_as_array() {
        let registry = registry();
        let first = article(&registry);
        let second = registry.instantiate("articles").unwrap();
        second.set_id("2");
        second.set_attribute("title", "Second");

        let body =
            serializer().serialize_resources(&[first, second], &SerializeOptions::default());
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1]["id"], "2");
    }
}
