//! Resource collections
//!
//! [`ResourceCollection`] is the ordered, paginated result of a fetch.
//! [`LinkedResourceCollection`] backs a to-many relationship slot: it knows
//! the relationship endpoints, the linkage the server disclosed, and tracks
//! the additions and removals the save cascade must replay.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use url::Url;
use wire::ResourceIdentifier;

use crate::resource::ResourceHandle;

/// Ordered list of resources with pagination links
///
/// Iteration order is the server's. The pagination URLs always reflect the
/// most recent server response for this collection; the client facade
/// mutates the collection in place when loading adjacent pages.
#[derive(Debug, Default)]
pub struct ResourceCollection {
    resources: Vec<ResourceHandle>,
    resources_url: Option<Url>,
    next_url: Option<Url>,
    previous_url: Option<Url>,
}

impl ResourceCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection over the given resources and links
    pub fn with_resources(
        resources: Vec<ResourceHandle>,
        resources_url: Option<Url>,
        next_url: Option<Url>,
        previous_url: Option<Url>,
    ) -> Self {
        Self {
            resources,
            resources_url,
            next_url,
            previous_url,
        }
    }

    /// The resources, in server order
    pub fn resources(&self) -> &[ResourceHandle] {
        &self.resources
    }

    /// Number of resources in the collection
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The resource at `index`
    pub fn get(&self, index: usize) -> Option<&ResourceHandle> {
        self.resources.get(index)
    }

    /// The first resource
    pub fn first(&self) -> Option<&ResourceHandle> {
        self.resources.first()
    }

    /// Iterate over the resources
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceHandle> {
        self.resources.iter()
    }

    /// The URL this collection was fetched from
    pub fn resources_url(&self) -> Option<&Url> {
        self.resources_url.as_ref()
    }

    /// The next page URL from the most recent response
    pub fn next_url(&self) -> Option<&Url> {
        self.next_url.as_ref()
    }

    /// The previous page URL from the most recent response
    pub fn previous_url(&self) -> Option<&Url> {
        self.previous_url.as_ref()
    }

    pub(crate) fn append_resources(&mut self, resources: Vec<ResourceHandle>) {
        self.resources.extend(resources);
    }

    pub(crate) fn prepend_resources(&mut self, resources: Vec<ResourceHandle>) {
        self.resources.splice(0..0, resources);
    }

    pub(crate) fn set_urls(
        &mut self,
        resources_url: Option<Url>,
        next_url: Option<Url>,
        previous_url: Option<Url>,
    ) {
        self.resources_url = resources_url;
        self.next_url = next_url;
        self.previous_url = previous_url;
    }
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a ResourceHandle;
    type IntoIter = std::slice::Iter<'a, ResourceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

struct LinkedInner {
    link_url: Option<Url>,
    resources_url: Option<Url>,
    linkage: Option<Vec<ResourceIdentifier>>,
    is_loaded: bool,
    resources: Vec<ResourceHandle>,
    added: Vec<ResourceHandle>,
    removed: Vec<ResourceHandle>,
}

/// The lazily loaded backing of a to-many relationship slot
///
/// `linkage` is exposed iff the server sent a `data` array; `is_loaded`
/// becomes true only after a full fetch of the related endpoint or after
/// resolution against the current identity pool. Local additions and
/// removals are tracked as deltas until a save cascade consumes them.
pub struct LinkedResourceCollection {
    inner: RwLock<LinkedInner>,
}

impl LinkedResourceCollection {
    /// Create a collection from relationship links and disclosed linkage
    pub fn new(
        resources_url: Option<Url>,
        link_url: Option<Url>,
        linkage: Option<Vec<ResourceIdentifier>>,
    ) -> Self {
        Self {
            inner: RwLock::new(LinkedInner {
                link_url,
                resources_url,
                linkage,
                is_loaded: false,
                resources: Vec::new(),
                added: Vec::new(),
                removed: Vec::new(),
            }),
        }
    }

    /// Create an empty, unlinked collection (for resources built locally)
    pub fn empty() -> Self {
        Self::new(None, None, None)
    }

    fn read(&self) -> RwLockReadGuard<'_, LinkedInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LinkedInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The relationship endpoint (`links.self`)
    pub fn link_url(&self) -> Option<Url> {
        self.read().link_url.clone()
    }

    /// The related-resources endpoint (`links.related`)
    pub fn resources_url(&self) -> Option<Url> {
        self.read().resources_url.clone()
    }

    /// The linkage the server disclosed, if it disclosed any
    pub fn linkage(&self) -> Option<Vec<ResourceIdentifier>> {
        self.read().linkage.clone()
    }

    /// Whether the membership has been fully materialized
    pub fn is_loaded(&self) -> bool {
        self.read().is_loaded
    }

    /// The materialized members
    pub fn resources(&self) -> Vec<ResourceHandle> {
        self.read().resources.clone()
    }

    /// Number of materialized members
    pub fn len(&self) -> usize {
        self.read().resources.len()
    }

    /// Whether there are no materialized members
    pub fn is_empty(&self) -> bool {
        self.read().resources.is_empty()
    }

    /// Whether `handle` is a materialized member (by instance identity)
    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.read().resources.iter().any(|r| Arc::ptr_eq(r, handle))
    }

    /// Link a resource, to be replayed as an add on the next save
    ///
    /// Adding a resource that is pending removal cancels the removal.
    pub fn add_resource(&self, handle: &ResourceHandle) {
        let mut inner = self.write();
        if let Some(pos) = inner.removed.iter().position(|r| Arc::ptr_eq(r, handle)) {
            inner.removed.remove(pos);
            inner.resources.push(handle.clone());
            return;
        }
        if inner.resources.iter().any(|r| Arc::ptr_eq(r, handle)) {
            return;
        }
        inner.resources.push(handle.clone());
        inner.added.push(handle.clone());
    }

    /// Unlink a resource, to be replayed as a remove on the next save
    ///
    /// Removing a resource that was only added locally just drops the add.
    pub fn remove_resource(&self, handle: &ResourceHandle) {
        let mut inner = self.write();
        inner.resources.retain(|r| !Arc::ptr_eq(r, handle));
        if let Some(pos) = inner.added.iter().position(|r| Arc::ptr_eq(r, handle)) {
            inner.added.remove(pos);
            return;
        }
        if !inner.removed.iter().any(|r| Arc::ptr_eq(r, handle)) {
            inner.removed.push(handle.clone());
        }
    }

    /// Link a resource the server already knows about; no delta is enqueued
    pub fn add_resource_as_existing(&self, handle: &ResourceHandle) {
        let mut inner = self.write();
        if !inner.resources.iter().any(|r| Arc::ptr_eq(r, handle)) {
            inner.resources.push(handle.clone());
        }
    }

    /// Resources added locally since the last save
    pub fn added_resources(&self) -> Vec<ResourceHandle> {
        self.read().added.clone()
    }

    /// Resources removed locally since the last save
    pub fn removed_resources(&self) -> Vec<ResourceHandle> {
        self.read().removed.clone()
    }

    pub(crate) fn clear_added(&self) {
        self.write().added.clear();
    }

    pub(crate) fn clear_removed(&self) {
        self.write().removed.clear();
    }

    /// Replace the membership with pool-resolved resources and mark loaded
    pub(crate) fn set_resolved(&self, resources: Vec<ResourceHandle>) {
        let mut inner = self.write();
        inner.resources = resources;
        inner.is_loaded = true;
    }
}

impl std::fmt::Debug for LinkedResourceCollection {
    // Shallow on purpose: members can point back into the same graph.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("LinkedResourceCollection")
            .field("len", &inner.resources.len())
            .field("is_loaded", &inner.is_loaded)
            .field("added", &inner.added.len())
            .field("removed", &inner.removed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::schema::ResourceSchema;

    fn bar() -> ResourceHandle {
        let schema = Arc::new(ResourceSchema::new("bars", vec![]));
        let resource = Resource::new(schema);
        resource.set_id("1");
        resource
    }

    #[test]
    fn test_add_tracks_delta() {
        let collection = LinkedResourceCollection::empty();
        let resource = bar();

        collection.add_resource(&resource);
        assert!(collection.contains(&resource));
        assert_eq!(collection.added_resources().len(), 1);
        assert!(collection.removed_resources().is_empty());
    }

    #[test]
    fn test_remove_of_local_add_cancels_out() {
        let collection = LinkedResourceCollection::empty();
        let resource = bar();

        collection.add_resource(&resource);
        collection.remove_resource(&resource);

        assert!(!collection.contains(&resource));
        assert!(collection.added_resources().is_empty());
        assert!(collection.removed_resources().is_empty());
    }

    #[test]
    fn test_remove_of_existing_tracks_delta() {
        let collection = LinkedResourceCollection::empty();
        let resource = bar();

        collection.add_resource_as_existing(&resource);
        assert!(collection.added_resources().is_empty());

        collection.remove_resource(&resource);
        assert_eq!(collection.removed_resources().len(), 1);
        assert!(!collection.contains(&resource));
    }

    #[test]
    fn test_re_add_cancels_pending_removal() {
        let collection = LinkedResourceCollection::empty();
        let resource = bar();

        collection.add_resource_as_existing(&resource);
        collection.remove_resource(&resource);
        collection.add_resource(&resource);

        assert!(collection.contains(&resource));
        assert!(collection.added_resources().is_empty());
        assert!(collection.removed_resources().is_empty());
    }

    #[test]
    fn test_collection_prepend_keeps_order() {
        let mut collection = ResourceCollection::new();
        let a = bar();
        let b = bar();
        let c = bar();
        collection.append_resources(vec![c.clone()]);
        collection.prepend_resources(vec![a.clone(), b.clone()]);

        assert!(Arc::ptr_eq(collection.get(0).unwrap(), &a));
        assert!(Arc::ptr_eq(collection.get(1).unwrap(), &b));
        assert!(Arc::ptr_eq(collection.get(2).unwrap(), &c));
    }
}
