//! Query facade over a graph store.

use crate::error::{GraphError, Result};
use crate::store::GraphStore;
use crate::types::{GraphRecord, RefId, Reference};
use std::collections::HashSet;

use super::traversal;

/// Topology questions about the subscriptions in a store.
#[derive(Clone, Copy)]
pub struct GraphQuery<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphQuery<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    fn limit(&self) -> usize {
        self.store.config().max_traversal_depth
    }

    /// Snapshot of the record for `id`.
    pub fn lookup(&self, id: RefId) -> Result<GraphRecord> {
        self.store.lookup(id)
    }

    /// The subscription `id` feeds directly into.
    pub fn destination(&self, id: RefId) -> Result<Option<Reference>> {
        Ok(self.store.lookup(id)?.destination)
    }

    /// Terminal subscription reached by following destinations, or `None` if
    /// `id` has no destination itself.
    pub fn final_destination(&self, id: RefId) -> Result<Option<Reference>> {
        let limit = self.limit();
        self.store
            .read(|records| traversal::final_destination(records, id, limit))
    }

    /// Every reference visited on the way to the final destination.
    pub fn destination_chain(&self, id: RefId) -> Result<Vec<Reference>> {
        let limit = self.limit();
        self.store
            .read(|records| traversal::destination_chain(records, id, limit))
    }

    /// True iff `candidate` is reachable from `id` by following destinations.
    pub fn has_destination(&self, id: RefId, candidate: RefId) -> Result<bool> {
        Ok(self
            .destination_chain(id)?
            .iter()
            .any(|r| r.id == candidate))
    }

    /// Immediate sources of `id`, in discovery order.
    pub fn sources(&self, id: RefId) -> Result<Vec<Reference>> {
        Ok(self.store.lookup(id)?.sources)
    }

    /// Transitive sources of `id`, depth-first.
    pub fn all_sources(&self, id: RefId) -> Result<Vec<Reference>> {
        let limit = self.limit();
        self.store
            .read(|records| traversal::all_sources(records, id, limit))
    }

    /// True iff `candidate` is a direct or transitive source of `id`.
    pub fn has_source(&self, id: RefId, candidate: RefId) -> Result<bool> {
        let limit = self.limit();
        self.store
            .read(|records| traversal::has_source(records, id, candidate, limit))
    }

    /// Subscriptions spawned by `id` during notification delivery, as of now.
    ///
    /// Grows while `id` is live; only final once it has terminated.
    pub fn merges(&self, id: RefId) -> Result<Vec<Reference>> {
        Ok(self.store.lookup(id)?.merges)
    }

    /// The subscription whose notification spawned `id`, if any.
    pub fn merge_host(&self, id: RefId) -> Result<Option<Reference>> {
        Ok(self.store.lookup(id)?.merged_into)
    }

    /// Where data from `id` ultimately goes, crossing merge boundaries.
    ///
    /// Follows destinations to the end of the chain; if that record was
    /// spawned as a merge, continues from its host. Returns `None` only for
    /// a record with neither a destination nor a merge host.
    pub fn attributed_destination(&self, id: RefId) -> Result<Option<Reference>> {
        let limit = self.limit();
        self.store.read(|records| {
            let mut hosts = HashSet::from([id]);
            let mut current = id;
            let mut result = None;

            loop {
                let terminal = traversal::final_destination(records, current, limit)?;
                let terminal_id = terminal.as_ref().map_or(current, |r| r.id);
                if terminal.is_some() {
                    result = terminal;
                }

                let host = records
                    .get(&terminal_id)
                    .and_then(|r| r.merged_into.clone());
                match host {
                    Some(host) => {
                        if !hosts.insert(host.id) {
                            return Err(GraphError::CycleDetected {
                                start: id,
                                at: host.id,
                            });
                        }
                        if hosts.len() > limit {
                            return Err(GraphError::DepthExceeded { start: id, limit });
                        }
                        current = host.id;
                        result = Some(host);
                        if !records.contains_key(&current) {
                            return Ok(result);
                        }
                    }
                    None => return Ok(result),
                }
            }
        })
    }

    /// Live-graph roots: records that feed nothing and were not spawned as
    /// merges, ordered by id.
    pub fn roots(&self) -> Vec<Reference> {
        self.collect(|r| r.destination.is_none() && r.merged_into.is_none())
    }

    /// References carrying `tag`, ordered by id.
    pub fn tagged(&self, tag: &str) -> Vec<Reference> {
        self.collect(|r| r.owner.tag.as_deref() == Some(tag))
    }

    fn collect(&self, keep: impl Fn(&GraphRecord) -> bool) -> Vec<Reference> {
        let mut found: Vec<Reference> = self.store.read(|records| {
            records
                .values()
                .filter(|r| keep(r))
                .map(|r| r.owner.clone())
                .collect()
        });
        found.sort_by_key(|r| r.id);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObservableId, SubscriberId};

    fn reference(id: u64) -> Reference {
        Reference::new(RefId(id), ObservableId(id), SubscriberId(id))
    }

    fn store_with(ids: &[u64]) -> GraphStore {
        let store = GraphStore::default();
        for &id in ids {
            store.insert_if_absent(&reference(id));
        }
        store
    }

    #[test]
    fn test_has_destination() {
        let store = store_with(&[1, 2, 3, 4]);
        store.add_source(RefId(2), RefId(1)).unwrap();
        store.add_source(RefId(3), RefId(2)).unwrap();
        let query = GraphQuery::new(&store);

        assert!(query.has_destination(RefId(1), RefId(2)).unwrap());
        assert!(query.has_destination(RefId(1), RefId(3)).unwrap());
        assert!(!query.has_destination(RefId(3), RefId(1)).unwrap());
        assert!(!query.has_destination(RefId(1), RefId(4)).unwrap());
        assert_eq!(query.destination(RefId(1)).unwrap(), Some(reference(2)));
    }

    #[test]
    fn test_final_destination_is_idempotent() {
        let store = store_with(&[1, 2, 3]);
        store.add_source(RefId(2), RefId(1)).unwrap();
        store.add_source(RefId(3), RefId(2)).unwrap();
        let query = GraphQuery::new(&store);

        let first = query.final_destination(RefId(1)).unwrap();
        let second = query.final_destination(RefId(1)).unwrap();
        assert_eq!(first, Some(reference(3)));
        assert_eq!(first, second);
    }

    #[test]
    fn test_attributed_destination_crosses_merge() {
        // 1 feeds 2; 3 was spawned while 1 was notifying; 4 feeds 3.
        let store = store_with(&[1, 2, 3, 4]);
        store.add_source(RefId(2), RefId(1)).unwrap();
        store.add_merge(RefId(1), RefId(3)).unwrap();
        store.add_source(RefId(3), RefId(4)).unwrap();
        let query = GraphQuery::new(&store);

        assert_eq!(query.final_destination(RefId(3)).unwrap(), None);
        assert_eq!(query.attributed_destination(RefId(3)).unwrap(), Some(reference(2)));
        assert_eq!(query.attributed_destination(RefId(4)).unwrap(), Some(reference(2)));
        assert_eq!(query.attributed_destination(RefId(2)).unwrap(), None);
        assert_eq!(query.merge_host(RefId(3)).unwrap(), Some(reference(1)));
    }

    #[test]
    fn test_attributed_destination_root_host() {
        let store = store_with(&[1, 2]);
        store.add_merge(RefId(1), RefId(2)).unwrap();
        let query = GraphQuery::new(&store);

        assert_eq!(query.attributed_destination(RefId(2)).unwrap(), Some(reference(1)));
    }

    #[test]
    fn test_roots_and_tags() {
        let store = GraphStore::default();
        store.insert_if_absent(&reference(1).with_tag("outer"));
        store.insert_if_absent(&reference(2));
        store.insert_if_absent(&reference(3).with_tag("inner"));
        store.add_source(RefId(2), RefId(1)).unwrap();
        store.add_merge(RefId(1), RefId(3)).unwrap();
        let query = GraphQuery::new(&store);

        assert_eq!(query.roots(), vec![reference(2)]);
        assert_eq!(query.tagged("inner"), vec![reference(3)]);
        assert!(query.tagged("missing").is_empty());
    }

    #[test]
    fn test_unknown_reference() {
        let store = GraphStore::default();
        let query = GraphQuery::new(&store);

        assert_eq!(
            query.merges(RefId(1)).unwrap_err(),
            GraphError::UnknownReference(RefId(1))
        );
        assert!(query.final_destination(RefId(1)).is_err());
        assert!(query.has_source(RefId(1), RefId(2)).is_err());
    }
}
