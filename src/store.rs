//! Graph store: the only mutable shared structure.
//!
//! Maps reference ids to graph records. All mutations happen under a single
//! write lock, so every edge insertion updates both endpoints atomically and
//! readers always observe a consistent (possibly stale) view.

use crate::error::{GraphError, Result};
use crate::events::{EventBus, GraphEvent};
use crate::types::{GraphRecord, RecordState, RefId, Reference, Timestamp};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Hard bound on the number of steps any query walk may take.
    pub max_traversal_depth: usize,

    /// Keep at most this many terminated records; the least recently
    /// terminated one is pruned when the bound is exceeded. A record still
    /// in use (see [`GraphStore::set_state_with`]) is held back and pruned by
    /// a later termination once it is idle, so the bound may be exceeded
    /// briefly.
    /// `None` keeps every record until explicitly pruned.
    pub retain_terminated: Option<usize>,

    /// Treat subscribes made while delivering an error or completion as
    /// setup (source edges) rather than merges. Some runtimes subscribe
    /// combinator inputs when an internal array source completes.
    pub terminal_subscribes_as_sources: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: 10_000,
            retain_terminated: None,
            terminal_subscribes_as_sources: false,
        }
    }
}

/// Criteria for explicit pruning. Live records are never pruned.
#[derive(Clone, Debug, Default)]
pub struct PruneOptions {
    /// Only prune records terminated strictly before this time.
    pub terminated_before: Option<Timestamp>,
    /// Only prune records whose owner carries one of these tags.
    pub tags: Option<Vec<String>>,
}

/// Result of a prune.
#[derive(Clone, Debug, Default)]
pub struct PruneResult {
    /// Records that were removed.
    pub pruned: Vec<RefId>,
    /// Records left in the store.
    pub remaining: usize,
}

/// Point-in-time copy of every record, for exporters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub taken_at: Timestamp,
    /// Sorted by id.
    pub records: Vec<GraphRecord>,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn get(&self, id: RefId) -> Option<&GraphRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id())
            .ok()
            .map(|i| &self.records[i])
    }
}

/// Bookkeeping for `retain_terminated`.
struct Retention {
    order: LruCache<RefId, ()>,
    /// Evicted from `order` while still in use.
    held: Vec<RefId>,
}

/// Concurrency-safe mapping from reference id to graph record.
pub struct GraphStore {
    config: GraphConfig,

    records: RwLock<HashMap<RefId, GraphRecord>>,

    /// Terminated ids in termination order (only with `retain_terminated`).
    terminated: Option<Mutex<Retention>>,

    events: EventBus,
}

impl GraphStore {
    pub fn new(config: GraphConfig) -> Self {
        let terminated = config.retain_terminated.map(|cap| {
            let cap = NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN);
            Mutex::new(Retention {
                order: LruCache::new(cap),
                held: Vec::new(),
            })
        });

        Self {
            config,
            records: RwLock::new(HashMap::new()),
            terminated,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Change feed for this store.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Reads ---

    /// Snapshot of the record for `id`.
    pub fn lookup(&self, id: RefId) -> Result<GraphRecord> {
        self.get(id).ok_or(GraphError::UnknownReference(id))
    }

    pub fn get(&self, id: RefId) -> Option<GraphRecord> {
        self.records.read().get(&id).cloned()
    }

    pub fn contains(&self, id: RefId) -> bool {
        self.records.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Run `f` against a consistent view of every record.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&HashMap<RefId, GraphRecord>) -> R) -> R {
        f(&self.records.read())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut records: Vec<GraphRecord> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.id());
        GraphSnapshot {
            taken_at: Timestamp::now(),
            records,
        }
    }

    // --- Mutations ---

    /// Create an empty record for `reference` unless one exists.
    ///
    /// Returns true if a record was created.
    pub fn insert_if_absent(&self, reference: &Reference) -> bool {
        let created = {
            let mut records = self.records.write();
            if records.contains_key(&reference.id) {
                false
            } else {
                records.insert(reference.id, GraphRecord::new(reference.clone()));
                true
            }
        };

        if created {
            self.events.publish(GraphEvent::RecordCreated {
                reference: reference.clone(),
            });
        }
        created
    }

    /// Wire `source` upstream of `destination`.
    ///
    /// Sets the source's destination and appends it to the destination's
    /// sources in one step. A source that already feeds a different
    /// destination keeps its original edge. An edge whose destination
    /// already leads back to `source` is refused with `CycleDetected`.
    pub fn add_source(&self, destination: RefId, source: RefId) -> Result<bool> {
        let added = {
            let mut records = self.records.write();
            let dest_owner = records
                .get(&destination)
                .map(|r| r.owner.clone())
                .ok_or(GraphError::UnknownReference(destination))?;
            let existing = records
                .get(&source)
                .map(|r| r.destination.as_ref().map(|d| d.id))
                .ok_or(GraphError::UnknownReference(source))?;

            match existing {
                Some(existing) if existing != destination => {
                    tracing::warn!(
                        %source,
                        %destination,
                        %existing,
                        "source already has a destination; keeping the first"
                    );
                    false
                }
                Some(_) => false,
                None => {
                    let limit = self.config.max_traversal_depth;
                    if Self::leads_to(&records, destination, source, limit) {
                        tracing::warn!(%source, %destination, "source edge would close a cycle");
                        return Err(GraphError::CycleDetected {
                            start: source,
                            at: destination,
                        });
                    }

                    let source_owner = match records.get_mut(&source) {
                        Some(record) => {
                            record.destination = Some(dest_owner);
                            record.owner.clone()
                        }
                        None => return Err(GraphError::UnknownReference(source)),
                    };
                    if let Some(dest_record) = records.get_mut(&destination) {
                        if !dest_record.sources.contains(&source_owner) {
                            dest_record.sources.push(source_owner);
                        }
                    }
                    true
                }
            }
        };

        if added {
            tracing::debug!(%source, %destination, "source added");
            self.events
                .publish(GraphEvent::SourceAdded { source, destination });
        }
        Ok(added)
    }

    /// Record `merge` as spawned by `host` during notification delivery.
    ///
    /// Never touches `destination` or `sources` of either record.
    pub fn add_merge(&self, host: RefId, merge: RefId) -> Result<bool> {
        let added = {
            let mut records = self.records.write();
            let host_owner = records
                .get(&host)
                .map(|r| r.owner.clone())
                .ok_or(GraphError::UnknownReference(host))?;
            let merge_record = records
                .get_mut(&merge)
                .ok_or(GraphError::UnknownReference(merge))?;
            if merge_record.merged_into.is_none() {
                merge_record.merged_into = Some(host_owner);
            }
            let merge_owner = merge_record.owner.clone();

            match records.get_mut(&host) {
                Some(host_record) if !host_record.merges.contains(&merge_owner) => {
                    host_record.merges.push(merge_owner);
                    true
                }
                _ => false,
            }
        };

        if added {
            tracing::debug!(%host, %merge, "merge added");
            self.events.publish(GraphEvent::MergeAdded { host, merge });
        }
        Ok(added)
    }

    /// Move a record to a new lifecycle state.
    ///
    /// Terminal states are sticky: once terminated, later transitions are
    /// ignored. Terminating may prune older terminated records when
    /// `retain_terminated` is configured.
    pub fn set_state(&self, id: RefId, state: RecordState) -> Result<()> {
        self.set_state_with(id, state, |_| false)
    }

    /// Like [`set_state`](Self::set_state), but records for which `in_use`
    /// returns true are never evicted by the retention bound.
    pub fn set_state_with(
        &self,
        id: RefId,
        state: RecordState,
        in_use: impl Fn(RefId) -> bool,
    ) -> Result<()> {
        let terminated = {
            let mut records = self.records.write();
            let record = records
                .get_mut(&id)
                .ok_or(GraphError::UnknownReference(id))?;
            if record.state.is_terminal() {
                return Ok(());
            }
            record.state = state;
            if state.is_terminal() {
                record.terminated_at = Some(Timestamp::now());
            }
            state.is_terminal()
        };

        if terminated {
            tracing::debug!(%id, ?state, "record terminated");
            self.events.publish(GraphEvent::Terminated { id, state });
            self.track_terminated(id, in_use);
        }
        Ok(())
    }

    /// Flag a record as damaged by an ordering violation.
    pub fn mark_faulted(&self, id: RefId) -> Result<()> {
        {
            let mut records = self.records.write();
            let record = records
                .get_mut(&id)
                .ok_or(GraphError::UnknownReference(id))?;
            if record.faulted {
                return Ok(());
            }
            record.faulted = true;
        }
        self.events.publish(GraphEvent::Faulted { id });
        Ok(())
    }

    /// Remove terminated records matching `options`.
    pub fn prune(&self, options: &PruneOptions) -> PruneResult {
        let (pruned, remaining) = {
            let mut records = self.records.write();
            let pruned: Vec<RefId> = records
                .values()
                .filter(|r| Self::prunable(r, options))
                .map(|r| r.id())
                .collect();
            for id in &pruned {
                records.remove(id);
            }
            (pruned, records.len())
        };

        self.forget_terminated(&pruned);
        if !pruned.is_empty() {
            tracing::debug!(count = pruned.len(), "records pruned");
            self.events.publish(GraphEvent::Pruned {
                ids: pruned.clone(),
            });
        }
        PruneResult { pruned, remaining }
    }

    /// Drop every record.
    pub fn reset(&self) {
        self.records.write().clear();
        if let Some(retention) = &self.terminated {
            let mut retention = retention.lock();
            retention.order.clear();
            retention.held.clear();
        }
        tracing::debug!("graph store reset");
        self.events.publish(GraphEvent::Reset);
    }

    fn prunable(record: &GraphRecord, options: &PruneOptions) -> bool {
        if !record.is_terminated() {
            return false;
        }
        if let Some(before) = options.terminated_before {
            if record.terminated_at.map_or(true, |at| at >= before) {
                return false;
            }
        }
        if let Some(tags) = &options.tags {
            match &record.owner.tag {
                Some(tag) if tags.contains(tag) => {}
                _ => return false,
            }
        }
        true
    }

    /// Whether following destinations from `from` reaches `target`.
    ///
    /// Gives up after `limit` steps or at a pruned record.
    fn leads_to(
        records: &HashMap<RefId, GraphRecord>,
        from: RefId,
        target: RefId,
        limit: usize,
    ) -> bool {
        let mut current = Some(from);
        let mut steps = 0usize;
        while let Some(id) = current {
            if id == target {
                return true;
            }
            steps += 1;
            if steps > limit {
                tracing::debug!(%from, limit, "cycle check stopped at depth limit");
                return false;
            }
            current = records
                .get(&id)
                .and_then(|r| r.destination.as_ref().map(|d| d.id));
        }
        false
    }

    fn track_terminated(&self, id: RefId, in_use: impl Fn(RefId) -> bool) {
        let Some(retention) = &self.terminated else {
            return;
        };
        let candidates: Vec<RefId> = {
            let mut retention = retention.lock();
            let mut candidates = std::mem::take(&mut retention.held);
            if let Some((old, _)) = retention.order.push(id, ()) {
                if old != id {
                    candidates.push(old);
                }
            }
            candidates
        };
        if candidates.is_empty() {
            return;
        }

        let (busy, idle): (Vec<RefId>, Vec<RefId>) =
            candidates.into_iter().partition(|c| in_use(*c));
        if !busy.is_empty() {
            tracing::trace!(count = busy.len(), "eviction deferred for records in use");
            retention.lock().held.extend(busy);
        }

        let mut removed = Vec::new();
        {
            let mut records = self.records.write();
            for old in idle {
                if records.get(&old).is_some_and(|r| r.is_terminated()) {
                    records.remove(&old);
                    removed.push(old);
                }
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "terminated records evicted");
            self.events.publish(GraphEvent::Pruned { ids: removed });
        }
    }

    fn forget_terminated(&self, ids: &[RefId]) {
        if let Some(retention) = &self.terminated {
            let mut retention = retention.lock();
            for id in ids {
                retention.order.pop(id);
            }
            retention.held.retain(|held| !ids.contains(held));
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}
