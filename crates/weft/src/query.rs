//! Composable structured queries
//!
//! A [`Query`] is a plain value describing what to fetch: a resource type
//! or explicit URL, ids, side-loads, filters, sparse fieldsets, sort order,
//! and pagination. The router compiles it into a URL; two field-wise equal
//! queries always compile to byte-identical URLs.

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::resource::ResourceHandle;

/// Comparison operator of a filter predicate
///
/// Only `Eq` reaches the wire today; the remaining operators are carried
/// for server dialects that extend the filter syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A filter predicate against a field path and a constant
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Domain field name
    pub field: String,
    /// Comparison operator
    pub operator: Comparison,
    /// Constant to compare against
    pub value: Value,
}

impl Predicate {
    /// An equality predicate
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Comparison::Eq,
            value: value.into(),
        }
    }

    /// A predicate with an explicit operator
    pub fn new(field: impl Into<String>, operator: Comparison, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// One sort descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    /// Domain field name
    pub field: String,
    /// Ascending (`+field`) or descending (`-field`)
    pub ascending: bool,
}

/// Pagination strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// Page-number pagination: `page[number]`, `page[size]`
    Page { number: u64, size: u64 },
    /// Offset pagination: `page[offset]`, `page[limit]`
    Offset { offset: u64, limit: u64 },
    /// Server-specific strategy, emitted as literal key/value pairs
    Custom(Vec<(String, String)>),
}

/// A structured query over one resource type or an explicit URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Resource type to query, unless `url` is given
    pub resource_type: Option<String>,
    /// Explicit ids to select
    pub resource_ids: Vec<String>,
    /// Escape hatch: a server-provided href used verbatim as the base
    pub url: Option<Url>,
    /// Relationship paths to side-load
    pub includes: Vec<String>,
    /// Filter predicates
    pub filters: Vec<Predicate>,
    /// Sparse fieldsets, keyed by resource type
    pub fields: BTreeMap<String, Vec<String>>,
    /// Sort descriptors, in priority order
    pub sorts: Vec<SortDescriptor>,
    /// Pagination strategy
    pub pagination: Option<Pagination>,
}

impl Query {
    /// Query every resource of `type_name`
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            resource_type: Some(type_name.into()),
            ..Default::default()
        }
    }

    /// Query one resource by id
    pub fn for_id(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(type_name.into()),
            resource_ids: vec![id.into()],
            ..Default::default()
        }
    }

    /// Query a set of resources by id
    pub fn for_ids<I, S>(type_name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: Some(type_name.into()),
            resource_ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Query a specific resource instance
    ///
    /// Captures the instance's canonical `url` when it has one, which takes
    /// precedence over the router-built URL.
    pub fn for_resource(resource: &ResourceHandle) -> Self {
        Self {
            resource_type: Some(resource.type_name().to_string()),
            resource_ids: resource.id().into_iter().collect(),
            url: resource.url(),
            ..Default::default()
        }
    }

    /// Query a server-provided href verbatim
    pub fn from_url(url: Url) -> Self {
        Self {
            url: Some(url),
            ..Default::default()
        }
    }

    /// Side-load a relationship path
    pub fn including(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Add an equality filter
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Predicate::eq(field, value));
        self
    }

    /// Add an arbitrary predicate
    pub fn filtered(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Restrict the fields returned for `type_name`
    pub fn selecting<I, S>(mut self, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(type_name.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sort ascending by `field`
    pub fn sorted_asc(mut self, field: impl Into<String>) -> Self {
        self.sorts.push(SortDescriptor {
            field: field.into(),
            ascending: true,
        });
        self
    }

    /// Sort descending by `field`
    pub fn sorted_desc(mut self, field: impl Into<String>) -> Self {
        self.sorts.push(SortDescriptor {
            field: field.into(),
            ascending: false,
        });
        self
    }

    /// Paginate the result
    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_accumulates() {
        let query = Query::for_type("articles")
            .including("author")
            .where_eq("title", "Hello")
            .selecting("articles", ["title", "body"])
            .sorted_desc("created_at")
            .paginated(Pagination::Page { number: 2, size: 10 });

        assert_eq!(query.resource_type.as_deref(), Some("articles"));
        assert_eq!(query.includes, vec!["author"]);
        assert_eq!(query.filters, vec![Predicate::eq("title", json!("Hello"))]);
        assert_eq!(query.fields["articles"], vec!["title", "body"]);
        assert_eq!(query.sorts.len(), 1);
        assert!(!query.sorts[0].ascending);
    }

    #[test]
    fn test_field_wise_equality() {
        let a = Query::for_ids("articles", ["1", "2"]).including("author");
        let b = Query::for_ids("articles", ["1", "2"]).including("author");
        assert_eq!(a, b);
    }
}
