//! Explicit LIFO stack of active subscription frames.

use crate::error::{GraphError, Result};
use crate::types::{Notification, Phase, RefId, Reference};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// Initial frame capacity; typical pipelines nest a few dozen deep.
const DEFAULT_CAPACITY: usize = 32;

/// One active subscription and what it is doing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub reference: Reference,
    pub phase: Phase,
    /// Which callback opened the frame.
    pub notification: Notification,
}

impl Frame {
    fn matches(&self, id: RefId, phase: Phase) -> bool {
        self.reference.id == id && self.phase == phase
    }
}

/// Growable stack of frames for one logical thread of execution.
#[derive(Clone, Debug, Default)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Enter a phase for `reference`. Re-entrant entries simply deepen the stack.
    pub fn push(&mut self, reference: Reference, phase: Phase) {
        let notification = match phase {
            Phase::Subscribing => Notification::Subscribe,
            Phase::Notifying => Notification::Next,
        };
        self.push_frame(Frame {
            reference,
            phase,
            notification,
        });
    }

    /// Enter the notifying phase for a specific kind of delivery.
    pub fn push_notification(&mut self, reference: Reference, notification: Notification) {
        let phase = match notification {
            Notification::Subscribe => Phase::Subscribing,
            _ => Phase::Notifying,
        };
        self.push_frame(Frame {
            reference,
            phase,
            notification,
        });
    }

    fn push_frame(&mut self, frame: Frame) {
        tracing::trace!(
            id = %frame.reference.id,
            phase = ?frame.phase,
            notification = ?frame.notification,
            depth = self.frames.len(),
            "push"
        );
        self.frames.push(frame);
    }

    /// Leave the phase entered by the matching `push`.
    ///
    /// Fails with `OutOfOrderCallback` if the top frame is not `(id, phase)`;
    /// the stack is left untouched in that case.
    pub fn pop(&mut self, id: RefId, phase: Phase) -> Result<Frame> {
        if self.frames.last().is_some_and(|top| top.matches(id, phase)) {
            if let Some(frame) = self.frames.pop() {
                tracing::trace!(%id, ?phase, depth = self.frames.len(), "pop");
                return Ok(frame);
            }
        }
        Err(GraphError::OutOfOrderCallback {
            reference: id,
            phase,
            found: self.frames.last().map(|f| (f.reference.id, f.phase)),
        })
    }

    /// Recover from an ordering violation by discarding the nearest frame
    /// matching `(id, phase)` along with every frame above it.
    ///
    /// Returns the frames that were stacked above the match, or `None` if no
    /// such frame exists (nothing is removed).
    pub fn unwind_to(&mut self, id: RefId, phase: Phase) -> Option<Vec<Frame>> {
        let index = self.frames.iter().rposition(|f| f.matches(id, phase))?;
        let mut removed: Vec<Frame> = self.frames.drain(index..).collect();
        removed.remove(0);
        Some(removed)
    }

    /// The innermost active frame, if any.
    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// One context stack per OS thread.
#[derive(Default)]
pub struct ThreadStacks {
    stacks: Mutex<HashMap<ThreadId, ContextStack>>,
}

impl ThreadStacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the calling thread's stack.
    ///
    /// Empty stacks are dropped afterwards so idle threads hold no state.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut ContextStack) -> R) -> R {
        let id = thread::current().id();
        let mut stacks = self.stacks.lock();
        let stack = stacks.entry(id).or_insert_with(ContextStack::new);
        let result = f(stack);
        if stack.is_empty() {
            stacks.remove(&id);
        }
        result
    }

    /// Snapshot of the calling thread's innermost frame.
    pub fn current(&self) -> Option<Frame> {
        self.with_current(|stack| stack.current().cloned())
    }

    /// Whether any thread has a frame open for `id`.
    pub fn is_open(&self, id: RefId) -> bool {
        self.stacks
            .lock()
            .values()
            .any(|stack| stack.frames.iter().any(|f| f.reference.id == id))
    }

    /// Number of threads with at least one active frame.
    pub fn active_threads(&self) -> usize {
        self.stacks.lock().len()
    }

    pub fn clear(&self) {
        self.stacks.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObservableId, SubscriberId};

    fn reference(id: u64) -> Reference {
        Reference::new(RefId(id), ObservableId(id), SubscriberId(id))
    }

    #[test]
    fn test_push_pop_lifo() {
        let mut stack = ContextStack::new();
        assert!(stack.current().is_none());

        stack.push(reference(1), Phase::Subscribing);
        stack.push(reference(2), Phase::Subscribing);
        assert_eq!(stack.current().unwrap().reference.id, RefId(2));

        let frame = stack.pop(RefId(2), Phase::Subscribing).unwrap();
        assert_eq!(frame.reference.id, RefId(2));
        assert_eq!(stack.current().unwrap().reference.id, RefId(1));

        stack.pop(RefId(1), Phase::Subscribing).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_reentrant_notifications_deepen_stack() {
        let mut stack = ContextStack::new();
        stack.push(reference(1), Phase::Notifying);
        stack.push(reference(1), Phase::Notifying);
        assert_eq!(stack.depth(), 2);

        stack.pop(RefId(1), Phase::Notifying).unwrap();
        assert_eq!(stack.current().unwrap().phase, Phase::Notifying);
        stack.pop(RefId(1), Phase::Notifying).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_push_notification_records_kind() {
        let mut stack = ContextStack::new();
        stack.push_notification(reference(1), Notification::Complete);

        let top = stack.current().unwrap();
        assert_eq!(top.phase, Phase::Notifying);
        assert_eq!(top.notification, Notification::Complete);
        stack.pop(RefId(1), Phase::Notifying).unwrap();
    }

    #[test]
    fn test_mismatched_pop_leaves_stack_intact() {
        let mut stack = ContextStack::new();
        stack.push(reference(1), Phase::Subscribing);

        let err = stack.pop(RefId(1), Phase::Notifying).unwrap_err();
        assert_eq!(
            err,
            GraphError::OutOfOrderCallback {
                reference: RefId(1),
                phase: Phase::Notifying,
                found: Some((RefId(1), Phase::Subscribing)),
            }
        );
        assert_eq!(stack.depth(), 1);

        let err = ContextStack::new().pop(RefId(4), Phase::Subscribing).unwrap_err();
        assert!(matches!(err, GraphError::OutOfOrderCallback { found: None, .. }));
    }

    #[test]
    fn test_unwind_to_removes_orphans() {
        let mut stack = ContextStack::new();
        stack.push(reference(1), Phase::Subscribing);
        stack.push(reference(2), Phase::Notifying);
        stack.push(reference(3), Phase::Subscribing);

        let orphans = stack.unwind_to(RefId(2), Phase::Notifying).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reference.id, RefId(3));
        assert_eq!(stack.depth(), 1);

        assert!(stack.unwind_to(RefId(9), Phase::Notifying).is_none());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_thread_stacks_are_per_thread() {
        let stacks = std::sync::Arc::new(ThreadStacks::new());
        stacks.with_current(|s| s.push(reference(1), Phase::Subscribing));

        let other = std::sync::Arc::clone(&stacks);
        let seen = std::thread::spawn(move || other.current())
            .join()
            .unwrap();
        assert!(seen.is_none());

        assert_eq!(stacks.current().unwrap().reference.id, RefId(1));
        assert_eq!(stacks.active_threads(), 1);

        stacks.with_current(|s| s.pop(RefId(1), Phase::Subscribing)).unwrap();
        assert_eq!(stacks.active_threads(), 0);
    }

    #[test]
    fn test_is_open_sees_every_thread() {
        let stacks = std::sync::Arc::new(ThreadStacks::new());
        stacks.with_current(|s| s.push(reference(1), Phase::Subscribing));

        let other = std::sync::Arc::clone(&stacks);
        std::thread::spawn(move || other.with_current(|s| s.push(reference(2), Phase::Notifying)))
            .join()
            .unwrap();

        assert!(stacks.is_open(RefId(1)));
        assert!(stacks.is_open(RefId(2)));
        assert!(!stacks.is_open(RefId(3)));

        stacks.with_current(|s| s.pop(RefId(1), Phase::Subscribing)).unwrap();
        assert!(!stacks.is_open(RefId(1)));
    }
}
