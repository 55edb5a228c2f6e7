//! Core types for subscription graph tracking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a tracked subscription.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefId(pub u64);

impl fmt::Debug for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefId({})", self.0)
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of an observable, supplied by the host runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservableId(pub u64);

/// Opaque identity of a subscriber, supplied by the host runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Stable identity of one observable/subscriber pair.
///
/// Two references denote the same graph node iff their ids are equal; the
/// timestamp and tag are descriptive only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reference {
    pub id: RefId,
    pub observable: ObservableId,
    pub subscriber: SubscriberId,
    pub timestamp: Timestamp,
    /// Opaque label installed by pipeline instrumentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Reference {
    /// Create a reference with the current time and no tag.
    pub fn new(id: RefId, observable: ObservableId, subscriber: SubscriberId) -> Self {
        Self {
            id,
            observable,
            subscriber,
            timestamp: Timestamp::now(),
            tag: None,
        }
    }

    /// Attach a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "#{} ({})", self.id, tag),
            None => write!(f, "#{}", self.id),
        }
    }
}

/// What a context frame's owner is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Inside the synchronous call tree of the owner's subscribe.
    Subscribing,
    /// Delivering a next/error/complete notification.
    Notifying,
}

/// Lifecycle notification kinds reported by the hook dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    Complete,
    Error,
    Next,
    Subscribe,
    Unsubscribe,
}

/// Lifecycle state of a graph record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Subscribe call has not returned yet.
    #[default]
    Subscribing,
    /// Set up and able to deliver notifications.
    Active,
    Completed,
    Errored,
    Unsubscribed,
}

impl RecordState {
    /// Whether the subscription has ended and its record may be pruned.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordState::Completed | RecordState::Errored | RecordState::Unsubscribed
        )
    }
}

/// Graph information for one subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphRecord {
    /// The subscription this record describes.
    pub owner: Reference,

    /// The subscription this one feeds directly into.
    pub destination: Option<Reference>,

    /// Immediate upstream subscriptions, in discovery order.
    pub sources: Vec<Reference>,

    /// Subscriptions spawned while this one was delivering a notification.
    pub merges: Vec<Reference>,

    /// The record whose `merges` this subscription was added to, if any.
    pub merged_into: Option<Reference>,

    pub state: RecordState,

    /// Set when an ordering violation was attributed to this record.
    pub faulted: bool,

    pub terminated_at: Option<Timestamp>,
}

impl GraphRecord {
    /// Create an empty record for a subscription that is starting up.
    pub fn new(owner: Reference) -> Self {
        Self {
            owner,
            destination: None,
            sources: Vec::new(),
            merges: Vec::new(),
            merged_into: None,
            state: RecordState::Subscribing,
            faulted: false,
            terminated_at: None,
        }
    }

    pub fn id(&self) -> RefId {
        self.owner.id
    }

    /// True if nothing is wired into or out of this record.
    pub fn is_isolated(&self) -> bool {
        self.destination.is_none()
            && self.merged_into.is_none()
            && self.sources.is_empty()
            && self.merges.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: u64) -> Reference {
        Reference::new(RefId(id), ObservableId(id), SubscriberId(id))
    }

    #[test]
    fn test_reference_identity_is_id_only() {
        let a = reference(1);
        let b = Reference::new(RefId(1), ObservableId(9), SubscriberId(9)).with_tag("other");
        assert_eq!(a, b);
        assert_ne!(a, reference(2));
    }

    #[test]
    fn test_reference_display() {
        assert_eq!(reference(3).to_string(), "#3");
        assert_eq!(reference(3).with_tag("outer").to_string(), "#3 (outer)");
    }

    #[test]
    fn test_new_record_is_isolated() {
        let record = GraphRecord::new(reference(1));
        assert!(record.is_isolated());
        assert_eq!(record.state, RecordState::Subscribing);
        assert!(!record.is_terminated());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RecordState::Completed.is_terminal());
        assert!(RecordState::Errored.is_terminal());
        assert!(RecordState::Unsubscribed.is_terminal());
        assert!(!RecordState::Active.is_terminal());
        assert!(!RecordState::Subscribing.is_terminal());
    }

    #[test]
    fn test_reference_serializes_without_empty_tag() {
        let json = serde_json::to_value(reference(7)).unwrap();
        assert!(json.get("tag").is_none());
        assert_eq!(json["id"], 7);
    }
}
