//! Graph builder: lifecycle handlers that wire records together.

use crate::context::{Frame, ThreadStacks};
use crate::error::{GraphError, Result};
use crate::query::GraphQuery;
use crate::store::{GraphConfig, GraphStore};
use crate::types::{Notification, Phase, RecordState, Reference};
use std::any::Any;
use std::sync::Arc;

use super::plugin::Plugin;

/// Builds the subscription graph from lifecycle callbacks.
pub struct GraphBuilder {
    store: Arc<GraphStore>,
    stacks: ThreadStacks,
}

impl GraphBuilder {
    /// Builder over a fresh store.
    pub fn new(config: GraphConfig) -> Self {
        Self::with_store(Arc::new(GraphStore::new(config)))
    }

    /// Builder writing into an existing store.
    pub fn with_store(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            stacks: ThreadStacks::new(),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Read-side queries over this builder's store.
    pub fn query(&self) -> GraphQuery<'_> {
        GraphQuery::new(&self.store)
    }

    /// Innermost active frame on the calling thread.
    pub fn current(&self) -> Option<Frame> {
        self.stacks.current()
    }

    /// Number of frames active on the calling thread.
    pub fn depth(&self) -> usize {
        self.stacks.with_current(|stack| stack.depth())
    }

    // --- Subscribe ---

    /// A subscription is starting.
    ///
    /// Attributes it to whatever is active on this thread, then enters its
    /// subscribing phase. The frame is pushed even if attribution fails so
    /// the matching `on_after_subscribe` stays balanced.
    pub fn on_before_subscribe(&self, reference: &Reference) -> Result<()> {
        self.store.insert_if_absent(reference);
        self.check_not_faulted(reference)?;

        let attributed = self.stacks.with_current(|stack| {
            let attributed = self.attribute(stack.current(), reference);
            stack.push(reference.clone(), Phase::Subscribing);
            attributed
        });
        if let Err(e) = &attributed {
            tracing::warn!(id = %reference.id, error = %e, "subscribe not attributed");
        }
        attributed
    }

    /// The subscribe call for `reference` has returned.
    pub fn on_after_subscribe(&self, reference: &Reference) -> Result<()> {
        self.leave(reference, Phase::Subscribing)?;
        self.transition(reference, RecordState::Active)
    }

    // --- Notifications ---

    pub fn on_before_next<V: ?Sized>(&self, reference: &Reference, _value: &V) -> Result<()> {
        self.enter_notifying(reference, Notification::Next)
    }

    pub fn on_after_next<V: ?Sized>(&self, reference: &Reference, _value: &V) -> Result<()> {
        self.leave(reference, Phase::Notifying)
    }

    pub fn on_before_error<E: ?Sized>(&self, reference: &Reference, _error: &E) -> Result<()> {
        self.enter_notifying(reference, Notification::Error)
    }

    pub fn on_after_error<E: ?Sized>(&self, reference: &Reference, _error: &E) -> Result<()> {
        self.leave(reference, Phase::Notifying)?;
        self.transition(reference, RecordState::Errored)
    }

    pub fn on_before_complete(&self, reference: &Reference) -> Result<()> {
        self.enter_notifying(reference, Notification::Complete)
    }

    pub fn on_after_complete(&self, reference: &Reference) -> Result<()> {
        self.leave(reference, Phase::Notifying)?;
        self.transition(reference, RecordState::Completed)
    }

    // --- Teardown ---

    /// The subscription was torn down; its record becomes prunable.
    pub fn on_after_unsubscribe(&self, reference: &Reference) -> Result<()> {
        self.transition(reference, RecordState::Unsubscribed)
    }

    /// Forget every frame and record.
    pub fn reset(&self) {
        self.stacks.clear();
        self.store.reset();
    }

    // --- Internals ---

    /// Wire `reference` to whatever `frame` says is active.
    fn attribute(&self, frame: Option<&Frame>, reference: &Reference) -> Result<()> {
        match frame {
            None => {
                tracing::debug!(id = %reference.id, "root subscribe");
                Ok(())
            }
            Some(frame) if frame.reference.id == reference.id => {
                tracing::warn!(id = %reference.id, "subscribe nested inside itself; no edge");
                Ok(())
            }
            Some(frame) if self.is_setup(frame) => self
                .store
                .add_source(frame.reference.id, reference.id)
                .map(|_| ()),
            Some(frame) => self
                .store
                .add_merge(frame.reference.id, reference.id)
                .map(|_| ()),
        }
    }

    fn enter_notifying(&self, reference: &Reference, notification: Notification) -> Result<()> {
        self.store.insert_if_absent(reference);
        self.check_not_faulted(reference)?;
        self.stacks
            .with_current(|stack| stack.push_notification(reference.clone(), notification));
        Ok(())
    }

    /// Whether a subscribe under `frame` is upstream setup rather than a merge.
    fn is_setup(&self, frame: &Frame) -> bool {
        match frame.notification {
            Notification::Subscribe => true,
            Notification::Error | Notification::Complete => {
                self.store.config().terminal_subscribes_as_sources
            }
            Notification::Next | Notification::Unsubscribe => false,
        }
    }

    /// Pop the frame pushed for `(reference, phase)`.
    ///
    /// On an ordering violation the nearest matching frame (and anything
    /// stacked above it) is discarded and the record is faulted; other
    /// records are left alone.
    fn leave(&self, reference: &Reference, phase: Phase) -> Result<()> {
        let outcome = self.stacks.with_current(|stack| {
            stack
                .pop(reference.id, phase)
                .map(|_| ())
                .map_err(|err| (err, stack.unwind_to(reference.id, phase)))
        });

        let (err, orphans) = match outcome {
            Ok(()) => return Ok(()),
            Err(failure) => failure,
        };

        // A faulted record never pushed, so a missing frame is expected.
        if orphans.is_none() && self.is_faulted(reference) {
            return Err(GraphError::RecordFaulted(reference.id));
        }

        tracing::warn!(id = %reference.id, ?phase, error = %err, "ordering violation");
        for orphan in orphans.iter().flatten() {
            tracing::warn!(
                id = %orphan.reference.id,
                phase = ?orphan.phase,
                "discarded frame above mismatched pop"
            );
        }
        if let Err(e) = self.store.mark_faulted(reference.id) {
            tracing::debug!(id = %reference.id, error = %e, "cannot fault missing record");
        }
        Err(err)
    }

    fn transition(&self, reference: &Reference, state: RecordState) -> Result<()> {
        match self.store.set_state_with(reference.id, state, |id| self.stacks.is_open(id)) {
            Err(GraphError::UnknownReference(id)) => {
                tracing::trace!(%id, ?state, "record already pruned");
                Ok(())
            }
            other => other,
        }
    }

    fn is_faulted(&self, reference: &Reference) -> bool {
        self.store.get(reference.id).is_some_and(|r| r.faulted)
    }

    fn check_not_faulted(&self, reference: &Reference) -> Result<()> {
        if self.is_faulted(reference) {
            return Err(GraphError::RecordFaulted(reference.id));
        }
        Ok(())
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl Plugin for GraphBuilder {
    fn before_subscribe(&self, reference: &Reference) -> Result<()> {
        self.on_before_subscribe(reference)
    }

    fn after_subscribe(&self, reference: &Reference) -> Result<()> {
        self.on_after_subscribe(reference)
    }

    fn before_next(&self, reference: &Reference, value: &dyn Any) -> Result<()> {
        self.on_before_next(reference, value)
    }

    fn after_next(&self, reference: &Reference, value: &dyn Any) -> Result<()> {
        self.on_after_next(reference, value)
    }

    fn before_error(&self, reference: &Reference, error: &dyn Any) -> Result<()> {
        self.on_before_error(reference, error)
    }

    fn after_error(&self, reference: &Reference, error: &dyn Any) -> Result<()> {
        self.on_after_error(reference, error)
    }

    fn before_complete(&self, reference: &Reference) -> Result<()> {
        self.on_before_complete(reference)
    }

    fn after_complete(&self, reference: &Reference) -> Result<()> {
        self.on_after_complete(reference)
    }

    fn after_unsubscribe(&self, reference: &Reference) -> Result<()> {
        self.on_after_unsubscribe(reference)
    }

    fn teardown(&self) {
        self.reset();
    }
}
