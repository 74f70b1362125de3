//! Query-to-URL compilation
//!
//! The router turns a [`Query`] into the URL the server expects and builds
//! relationship-endpoint URLs for the save cascade. Parameters are appended
//! in a fixed order so equal queries always produce identical URLs, and the
//! query string is assembled raw: servers in the wild expect literal
//! `[`, `]`, `,` and `+` in these parameters.

use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::format::KeyFormat;
use crate::query::{Comparison, Pagination, Query};
use crate::resource::ResourceHandle;
use crate::schema::{Field, FieldKind, Registry};

/// Compiles queries into URLs against one base URL
#[derive(Debug, Clone)]
pub struct Router {
    base_url: Url,
    key_format: KeyFormat,
    registry: Arc<Registry>,
}

impl Router {
    /// Create a router for `base_url`
    pub fn new(base_url: Url, key_format: KeyFormat, registry: Arc<Registry>) -> Self {
        Self {
            base_url,
            key_format,
            registry,
        }
    }

    /// The base URL every path is built under
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `<base>/<type>`
    pub fn url_for_type(&self, type_name: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base(), type_name)).map_err(Error::from)
    }

    /// `<base>/<type>/<id>/relationships/<name>`
    pub fn url_for_relationship(&self, resource: &ResourceHandle, field: &Field) -> Result<Url> {
        let id = resource.id().ok_or(Error::ResourceIdMissing)?;
        let name = self.key_format.encode(field.serialized_name());
        Url::parse(&format!(
            "{}/{}/{}/relationships/{}",
            self.base(),
            resource.type_name(),
            id,
            name
        ))
        .map_err(Error::from)
    }

    /// Compile a query into a URL
    ///
    /// A single-id query takes the canonical singular path form; multi-id
    /// queries use the `filter[id]` form. A query's own `url` is used
    /// verbatim as the base when present.
    pub fn url_for_query(&self, query: &Query) -> Result<Url> {
        let mut params: Vec<String> = Vec::new();

        let base = match &query.url {
            Some(url) => url.as_str().to_string(),
            None => {
                let type_name = query
                    .resource_type
                    .as_deref()
                    .ok_or(Error::UnroutableQuery)?;
                if query.resource_ids.len() == 1 {
                    format!("{}/{}/{}", self.base(), type_name, query.resource_ids[0])
                } else {
                    if query.resource_ids.len() > 1 {
                        params.push(format!("filter[id]={}", query.resource_ids.join(",")));
                    }
                    format!("{}/{}", self.base(), type_name)
                }
            }
        };

        let primary_type = query.resource_type.as_deref();

        if !query.includes.is_empty() {
            let paths: Vec<String> = query
                .includes
                .iter()
                .map(|path| self.include_path(primary_type, path))
                .collect();
            params.push(format!("include={}", paths.join(",")));
        }

        for predicate in &query.filters {
            match predicate.operator {
                Comparison::Eq => params.push(format!(
                    "filter[{}]={}",
                    self.wire_key(primary_type, &predicate.field),
                    literal(&predicate.value)
                )),
                operator => {
                    warn!(?operator, field = %predicate.field, "filter operator not routable; skipping");
                }
            }
        }

        for (type_name, fields) in &query.fields {
            let names: Vec<String> = fields
                .iter()
                .map(|field| self.wire_key(Some(type_name), field))
                .collect();
            params.push(format!("fields[{}]={}", type_name, names.join(",")));
        }

        if !query.sorts.is_empty() {
            let sorts: Vec<String> = query
                .sorts
                .iter()
                .map(|sort| {
                    let sign = if sort.ascending { "+" } else { "-" };
                    format!("{}{}", sign, self.wire_key(primary_type, &sort.field))
                })
                .collect();
            params.push(format!("sort={}", sorts.join(",")));
        }

        match &query.pagination {
            Some(Pagination::Page { number, size }) => {
                params.push(format!("page[number]={}", number));
                params.push(format!("page[size]={}", size));
            }
            Some(Pagination::Offset { offset, limit }) => {
                params.push(format!("page[offset]={}", offset));
                params.push(format!("page[limit]={}", limit));
            }
            Some(Pagination::Custom(pairs)) => {
                for (key, value) in pairs {
                    params.push(format!("{}={}", key, value));
                }
            }
            None => {}
        }

        if params.is_empty() {
            return Url::parse(&base).map_err(Error::from);
        }
        let separator = if base.contains('?') { '&' } else { '?' };
        Url::parse(&format!("{}{}{}", base, separator, params.join("&"))).map_err(Error::from)
    }

    /// Wire form of a domain field name, honoring the schema's wire names
    fn wire_key(&self, type_name: Option<&str>, field_name: &str) -> String {
        let serialized = type_name
            .and_then(|t| self.registry.get(t).ok())
            .and_then(|schema| {
                schema
                    .field(field_name)
                    .map(|f| f.serialized_name().to_string())
            })
            .unwrap_or_else(|| field_name.to_string());
        self.key_format.encode(&serialized)
    }

    /// Wire form of a dotted include path, following the relationship chain
    fn include_path(&self, primary_type: Option<&str>, path: &str) -> String {
        let mut current = primary_type.map(str::to_string);
        let mut segments = Vec::new();
        for segment in path.split('.') {
            let field = current
                .as_deref()
                .and_then(|t| self.registry.get(t).ok())
                .and_then(|schema| schema.field(segment).cloned());
            match field {
                Some(field) => {
                    segments.push(self.key_format.encode(field.serialized_name()));
                    current = match field.kind() {
                        FieldKind::ToOne { related_type } | FieldKind::ToMany { related_type } => {
                            Some(related_type.clone())
                        }
                        FieldKind::Attribute(_) => None,
                    };
                }
                None => {
                    segments.push(self.key_format.encode(segment));
                    current = None;
                }
            }
        }
        segments.join(".")
    }
}

/// Filter constants render unquoted
fn literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
