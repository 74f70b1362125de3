//! Identity pool for one deserialization
//!
//! The pool guarantees at most one instance per `(type, id)` within a
//! single deserialization scope. It is an ordered arena plus a keyed
//! lookup: the order carries the positional semantics that map server
//! responses onto caller-provided target instances whose ids are not yet
//! known.

use std::collections::HashMap;

use crate::error::Result;
use crate::resource::ResourceHandle;
use crate::schema::Registry;

/// Per-deserialization identity pool
///
/// Pools are never shared across deserializations.
#[derive(Default)]
pub struct ResourcePool {
    resources: Vec<ResourceHandle>,
    by_key: HashMap<(String, String), usize>,
}

impl ResourcePool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the pool with caller-provided mapping targets
    pub fn seed(&mut self, targets: &[ResourceHandle]) {
        for target in targets {
            self.insert(target.clone());
        }
    }

    /// Every pooled resource, in insertion order
    pub fn resources(&self) -> &[ResourceHandle] {
        &self.resources
    }

    /// Find a pooled resource by `(type, id)`
    pub fn lookup(&self, type_name: &str, id: &str) -> Option<&ResourceHandle> {
        self.by_key
            .get(&(type_name.to_string(), id.to_string()))
            .map(|&index| &self.resources[index])
    }

    /// Fetch-or-create by `(type, id)`
    ///
    /// Resolution order:
    /// 1. a pooled resource with a matching key;
    /// 2. when `index` is given, the `index`-th pooled resource of the type
    ///    (a mapping target whose id the server is assigning right now);
    /// 3. a fresh instance, appended to the pool.
    pub fn dispense(
        &mut self,
        registry: &Registry,
        type_name: &str,
        id: &str,
        index: Option<usize>,
    ) -> Result<ResourceHandle> {
        if let Some(existing) = self.lookup(type_name, id) {
            return Ok(existing.clone());
        }

        if let Some(index) = index {
            if let Some((position, target)) = self.nth_of_type(type_name, index) {
                target.set_id(id);
                self.by_key
                    .insert((type_name.to_string(), id.to_string()), position);
                return Ok(target);
            }
        }

        let resource = registry.instantiate(type_name)?;
        resource.set_id(id);
        self.insert(resource.clone());
        Ok(resource)
    }

    fn insert(&mut self, resource: ResourceHandle) {
        let index = self.resources.len();
        if let Some(id) = resource.id() {
            self.by_key
                .insert((resource.type_name().to_string(), id), index);
        }
        self.resources.push(resource);
    }

    /// The `index`-th pooled resource of `type_name`, with its arena position
    fn nth_of_type(&self, type_name: &str, index: usize) -> Option<(usize, ResourceHandle)> {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.type_name() == type_name)
            .nth(index)
            .map(|(position, r)| (position, r.clone()))
    }
}
