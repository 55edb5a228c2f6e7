//! Pair-to-reference assignment.

use crate::types::{ObservableId, RefId, Reference, SubscriberId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

type Pair = (ObservableId, SubscriberId);

/// Hands out references for observable/subscriber pairs.
pub struct SubscriptionRegistry {
    /// Live references by pair.
    refs: RwLock<HashMap<Pair, Reference>>,
    /// Tags installed on observables before they are subscribed.
    tags: RwLock<HashMap<ObservableId, String>>,
    /// Counter for generating reference ids.
    next_id: AtomicU64,
    /// Last issued timestamp, keeps timestamps strictly increasing.
    last_timestamp: AtomicI64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            refs: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            last_timestamp: AtomicI64::new(0),
        }
    }

    /// Reference for the pair, assigning one on first sight.
    pub fn get(&self, observable: ObservableId, subscriber: SubscriberId) -> Reference {
        if let Some(existing) = self.refs.read().get(&(observable, subscriber)) {
            return existing.clone();
        }

        let mut refs = self.refs.write();
        refs.entry((observable, subscriber))
            .or_insert_with(|| {
                let id = RefId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let mut reference = Reference::new(id, observable, subscriber);
                reference.timestamp = self.next_timestamp();
                reference.tag = self.tags.read().get(&observable).cloned();
                tracing::trace!(%id, ?observable, ?subscriber, "reference assigned");
                reference
            })
            .clone()
    }

    /// Reference for the pair without assigning one.
    pub fn lookup(&self, observable: ObservableId, subscriber: SubscriberId) -> Option<Reference> {
        self.refs.read().get(&(observable, subscriber)).cloned()
    }

    /// All references assigned for an observable, ordered by id.
    pub fn references_for(&self, observable: ObservableId) -> Vec<Reference> {
        let mut found: Vec<Reference> = self
            .refs
            .read()
            .iter()
            .filter(|((o, _), _)| *o == observable)
            .map(|(_, r)| r.clone())
            .collect();
        found.sort_by_key(|r| r.id);
        found
    }

    /// Label an observable. Applies to references assigned afterwards.
    pub fn tag(&self, observable: ObservableId, tag: impl Into<String>) {
        self.tags.write().insert(observable, tag.into());
    }

    /// Forget a pair. A later `get` assigns a fresh reference.
    pub fn release(&self, observable: ObservableId, subscriber: SubscriberId) -> Option<Reference> {
        self.refs.write().remove(&(observable, subscriber))
    }

    pub fn len(&self) -> usize {
        self.refs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.read().is_empty()
    }

    pub fn clear(&self) {
        self.refs.write().clear();
        self.tags.write().clear();
    }

    fn next_timestamp(&self) -> Timestamp {
        let now = Timestamp::now().0;
        let mut last = self.last_timestamp.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_timestamp.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Timestamp(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_idempotent_per_pair() {
        let registry = SubscriptionRegistry::new();
        let a = registry.get(ObservableId(1), SubscriberId(1));
        let again = registry.get(ObservableId(1), SubscriberId(1));
        let b = registry.get(ObservableId(1), SubscriberId(2));

        assert_eq!(a, again);
        assert_eq!(a.timestamp, again.timestamp);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_and_timestamps_increase() {
        let registry = SubscriptionRegistry::new();
        let refs: Vec<Reference> = (0..50)
            .map(|i| registry.get(ObservableId(i), SubscriberId(i)))
            .collect();

        for pair in refs.windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_tag_applies_to_new_references() {
        let registry = SubscriptionRegistry::new();
        let before = registry.get(ObservableId(1), SubscriberId(1));
        registry.tag(ObservableId(1), "outer");
        let after = registry.get(ObservableId(1), SubscriberId(2));

        assert_eq!(before.tag, None);
        assert_eq!(after.tag.as_deref(), Some("outer"));
        assert_eq!(registry.references_for(ObservableId(1)).len(), 2);
    }

    #[test]
    fn test_release_assigns_fresh_reference() {
        let registry = SubscriptionRegistry::new();
        let first = registry.get(ObservableId(1), SubscriberId(1));
        assert_eq!(registry.release(ObservableId(1), SubscriberId(1)), Some(first.clone()));
        assert!(registry.lookup(ObservableId(1), SubscriberId(1)).is_none());

        let second = registry.get(ObservableId(1), SubscriberId(1));
        assert_ne!(first, second);
    }
}
