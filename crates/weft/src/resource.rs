//! Typed in-memory resource instances
//!
//! A [`Resource`] carries identity (`type`, optional `id`), a canonical self
//! URL when known, typed attribute slots, raw relationship records, and the
//! loaded flag. Instances are shared through [`ResourceHandle`]s so one
//! object can sit in several places of a graph; identity is pointer
//! identity. An instance whose `is_loaded` is false is a stub produced from
//! linkage: only its `id` and `url` are meaningful.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use url::Url;
use wire::ResourceIdentifier;

use crate::collection::LinkedResourceCollection;
use crate::schema::ResourceSchema;

/// A typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Opaque JSON value (plain attributes)
    Json(Value),
    /// Boolean attribute
    Bool(bool),
    /// Date attribute, normalized to UTC
    Date(DateTime<Utc>),
    /// URL attribute
    Url(Url),
}

impl AttributeValue {
    /// The value as a string slice, for plain string attributes
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Json(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// The value as a date
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The value as a URL
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            AttributeValue::Url(u) => Some(u),
            _ => None,
        }
    }

    /// The value as a raw JSON value, for plain attributes
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            AttributeValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        AttributeValue::Json(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Json(Value::String(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Json(Value::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Json(Value::from(value))
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Date(value)
    }
}

impl From<Url> for AttributeValue {
    fn from(value: Url) -> Self {
        AttributeValue::Url(value)
    }
}

/// Raw relationship record as the server disclosed it
///
/// `linkage` distinguishes three states: `None` means the server declined
/// to disclose linkage, `Some(vec![])` means confirmed empty, and a
/// non-empty list is the authoritative membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipData {
    /// The relationship endpoint (`links.self`)
    pub self_url: Option<Url>,
    /// The related-resources endpoint (`links.related`)
    pub related_url: Option<Url>,
    /// Disclosed linkage, if any
    pub linkage: Option<Vec<ResourceIdentifier>>,
}

/// The value of a to-one relationship slot
#[derive(Debug, Clone, Default)]
pub enum ToOneValue {
    /// The server never disclosed this relationship
    #[default]
    Undisclosed,
    /// The server confirmed the relationship is empty
    Empty,
    /// The related resource (possibly an unloaded stub)
    Linked(ResourceHandle),
}

impl ToOneValue {
    /// The linked resource, if there is one
    pub fn resource(&self) -> Option<&ResourceHandle> {
        match self {
            ToOneValue::Linked(handle) => Some(handle),
            _ => None,
        }
    }

    /// Whether the server confirmed the relationship empty
    pub fn is_empty(&self) -> bool {
        matches!(self, ToOneValue::Empty)
    }

    /// Whether the relationship was never disclosed
    pub fn is_undisclosed(&self) -> bool {
        matches!(self, ToOneValue::Undisclosed)
    }
}

/// The mutable state of one resource instance
#[derive(Default)]
struct ResourceData {
    id: Option<String>,
    url: Option<Url>,
    is_loaded: bool,
    meta: Map<String, Value>,
    attributes: HashMap<String, AttributeValue>,
    relationships: HashMap<String, RelationshipData>,
    to_one: HashMap<String, ToOneValue>,
    to_many: HashMap<String, Arc<LinkedResourceCollection>>,
    dirty: HashSet<String>,
}

/// Shared handle to a resource instance
pub type ResourceHandle = Arc<Resource>;

/// A typed, addressable resource instance
///
/// State lives behind a lock so one instance can be shared across a graph;
/// the client only mutates a resource while an operation targeting it is in
/// flight, and user code must not mutate it concurrently with the client.
pub struct Resource {
    schema: Arc<ResourceSchema>,
    data: RwLock<ResourceData>,
}

impl Resource {
    /// Create a fresh, empty instance of the given schema
    pub fn new(schema: Arc<ResourceSchema>) -> ResourceHandle {
        Arc::new(Self {
            schema,
            data: RwLock::new(ResourceData::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ResourceData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ResourceData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The resource type string
    pub fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    /// The schema this instance was built from
    pub fn schema(&self) -> &Arc<ResourceSchema> {
        &self.schema
    }

    /// The resource id; absent means unsaved
    pub fn id(&self) -> Option<String> {
        self.read().id.clone()
    }

    /// Assign the resource id
    pub fn set_id(&self, id: impl Into<String>) {
        self.write().id = Some(id.into());
    }

    /// The canonical self URL, when known
    pub fn url(&self) -> Option<Url> {
        self.read().url.clone()
    }

    /// Record the canonical self URL
    pub fn set_url(&self, url: Url) {
        self.write().url = Some(url);
    }

    /// Whether the attributes reflect a successful fetch, create, or update
    pub fn is_loaded(&self) -> bool {
        self.read().is_loaded
    }

    /// Set the loaded flag
    pub fn set_loaded(&self, loaded: bool) {
        self.write().is_loaded = loaded;
    }

    /// Free-form metadata from the resource object
    pub fn meta(&self) -> Map<String, Value> {
        self.read().meta.clone()
    }

    pub(crate) fn set_meta(&self, meta: Map<String, Value>) {
        self.write().meta = meta;
    }

    /// The `{type, id}` identifier, once the resource has an id
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        self.read()
            .id
            .as_ref()
            .map(|id| ResourceIdentifier::new(self.type_name(), id))
    }

    /// Read an attribute slot
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.read().attributes.get(name).cloned()
    }

    /// Write an attribute slot and mark the field dirty
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let mut data = self.write();
        data.attributes.insert(name.clone(), value.into());
        data.dirty.insert(name);
    }

    /// Clear an attribute slot and mark the field dirty
    pub fn clear_attribute(&self, name: &str) {
        let mut data = self.write();
        data.attributes.remove(name);
        data.dirty.insert(name.to_string());
    }

    /// Write an attribute slot without touching the dirty set (server state)
    pub(crate) fn apply_attribute(&self, name: impl Into<String>, value: AttributeValue) {
        self.write().attributes.insert(name.into(), value);
    }

    /// Fields written since the last save or fetch
    pub fn dirty_fields(&self) -> HashSet<String> {
        self.read().dirty.clone()
    }

    pub(crate) fn clear_dirty(&self) {
        self.write().dirty.clear();
    }

    /// The raw relationship record for `name`, as last disclosed
    pub fn relationship(&self, name: &str) -> Option<RelationshipData> {
        self.read().relationships.get(name).cloned()
    }

    pub(crate) fn set_relationship(&self, name: impl Into<String>, data: RelationshipData) {
        self.write().relationships.insert(name.into(), data);
    }

    /// Read a to-one slot
    pub fn to_one(&self, name: &str) -> ToOneValue {
        self.read().to_one.get(name).cloned().unwrap_or_default()
    }

    /// Write a to-one slot
    pub fn set_to_one(&self, name: impl Into<String>, value: ToOneValue) {
        self.write().to_one.insert(name.into(), value);
    }

    /// Read a to-many slot
    pub fn to_many(&self, name: &str) -> Option<Arc<LinkedResourceCollection>> {
        self.read().to_many.get(name).cloned()
    }

    /// Read a to-many slot, creating an empty collection if the slot is empty
    pub fn to_many_or_empty(&self, name: &str) -> Arc<LinkedResourceCollection> {
        let mut data = self.write();
        data.to_many
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LinkedResourceCollection::empty()))
            .clone()
    }

    pub(crate) fn set_to_many(&self, name: impl Into<String>, collection: Arc<LinkedResourceCollection>) {
        self.write().to_many.insert(name.into(), collection);
    }

    /// Clear every field slot and mark the instance unloaded
    ///
    /// `id`, type, and `url` survive, so the instance can be re-fetched.
    pub fn unload(&self) {
        let mut data = self.write();
        data.attributes.clear();
        data.relationships.clear();
        data.to_one.clear();
        data.to_many.clear();
        data.dirty.clear();
        data.is_loaded = false;
    }
}

impl std::fmt::Debug for Resource {
    // Shallow on purpose: relationship slots can form cycles.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.read();
        f.debug_struct("Resource")
            .field("type", &self.schema.type_name())
            .field("id", &data.id)
            .field("is_loaded", &data.is_loaded)
            .finish()
    }
}
