//! Broadcast of graph events to watchers.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, GraphEvent, WatchConfig, WatchHandle, WatcherId};

struct Watcher {
    config: WatchConfig,
    sender: Sender<GraphEvent>,
}

impl Watcher {
    /// Returns false if the buffer is full or the receiver is gone.
    fn try_send(&self, event: GraphEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Fan-out of graph events to bounded per-watcher channels.
pub struct EventBus {
    watchers: RwLock<HashMap<WatcherId, Watcher>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a watcher.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        let id = WatcherId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.watchers.write().insert(id, Watcher { config, sender });
        tracing::debug!(watcher = id.0, "watcher registered");

        WatchHandle { id, receiver }
    }

    /// Remove a watcher.
    pub fn unwatch(&self, id: WatcherId) {
        if let Some(watcher) = self.watchers.write().remove(&id) {
            let _ = watcher.sender.try_send(GraphEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Deliver an event to every interested watcher. Never blocks.
    pub fn publish(&self, event: GraphEvent) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            if watchers.is_empty() {
                return;
            }
            for (id, watcher) in watchers.iter() {
                if watcher.config.filter.accepts(&event) && !watcher.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for id in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    tracing::warn!(watcher = id.0, "dropping slow watcher");
                    let _ = watcher.sender.try_send(GraphEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
