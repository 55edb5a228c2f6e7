//! Event and watcher types for the graph change feed.

use crate::types::{RecordState, RefId, Reference};
use serde::{Deserialize, Serialize};

/// Configuration for a watcher.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Max buffered events before the watcher is dropped.
    /// Default: 1024
    pub buffer_size: usize,

    /// Which events to deliver.
    pub filter: WatchFilter,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            filter: WatchFilter::all(),
        }
    }
}

/// Event categories a watcher is interested in.
#[derive(Clone, Debug, Default)]
pub struct WatchFilter {
    /// Record creation, source and merge edges.
    pub include_structure: bool,

    /// Terminations and faults.
    pub include_lifecycle: bool,

    /// Pruning and resets.
    pub include_maintenance: bool,
}

impl WatchFilter {
    /// Only structural changes.
    pub fn structure() -> Self {
        Self {
            include_structure: true,
            ..Default::default()
        }
    }

    /// Only terminations and faults.
    pub fn lifecycle() -> Self {
        Self {
            include_lifecycle: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            include_structure: true,
            include_lifecycle: true,
            include_maintenance: true,
        }
    }

    pub(crate) fn accepts(&self, event: &GraphEvent) -> bool {
        match event {
            GraphEvent::RecordCreated { .. }
            | GraphEvent::SourceAdded { .. }
            | GraphEvent::MergeAdded { .. } => self.include_structure,
            GraphEvent::Terminated { .. } | GraphEvent::Faulted { .. } => self.include_lifecycle,
            GraphEvent::Pruned { .. } | GraphEvent::Reset => self.include_maintenance,
            GraphEvent::Dropped { .. } => true,
        }
    }
}

/// Changes published by the graph store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    // --- Structure ---
    /// A subscription started and got a record.
    RecordCreated { reference: Reference },

    /// `source` was discovered upstream of `destination` during setup.
    SourceAdded { source: RefId, destination: RefId },

    /// `merge` was spawned while `host` delivered a notification.
    MergeAdded { host: RefId, merge: RefId },

    // --- Lifecycle ---
    Terminated { id: RefId, state: RecordState },

    /// An ordering violation was attributed to this record.
    Faulted { id: RefId },

    // --- Maintenance ---
    Pruned { ids: Vec<RefId> },

    Reset,

    /// The watcher was dropped.
    Dropped { reason: DropReason },
}

/// Why a watcher was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

/// Handle returned to a watcher.
pub struct WatchHandle {
    pub id: WatcherId,
    pub receiver: crossbeam_channel::Receiver<GraphEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<GraphEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<GraphEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<GraphEvent> {
        self.receiver.try_iter().collect()
    }
}
