//! # Subscription Graph
//!
//! Debugging instrumentation for reactive-stream pipelines. Observes the
//! lifecycle of every subscription and incrementally builds a live dependency
//! graph: which subscription feeds which, and which subscriptions were spawned
//! dynamically while another was delivering a value.
//!
//! ## Core Concepts
//!
//! - **Reference**: stable identity of one observable/subscriber pair
//! - **Source / Destination**: static wiring discovered during subscribe
//! - **Merge**: a subscription spawned during notification delivery
//! - **Final destination**: where data ultimately goes, computed at query time
//!
//! ## Example
//!
//! ```ignore
//! use rxgraph::{GraphBuilder, SubscriptionRegistry, ObservableId, SubscriberId};
//!
//! let registry = SubscriptionRegistry::new();
//! let builder = GraphBuilder::default();
//!
//! let mapped = registry.get(ObservableId(2), SubscriberId(10));
//! let subject = registry.get(ObservableId(1), SubscriberId(11));
//!
//! // mapped.subscribe() subscribes the subject from inside its own subscribe
//! builder.on_before_subscribe(&mapped)?;
//! builder.on_before_subscribe(&subject)?;
//! builder.on_after_subscribe(&subject)?;
//! builder.on_after_subscribe(&mapped)?;
//!
//! assert_eq!(builder.query().final_destination(subject.id)?, Some(mapped));
//! ```

pub mod builder;
pub mod context;
pub mod error;
pub mod events;
pub mod query;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use builder::{GraphBuilder, Plugin};
pub use context::{ContextStack, Frame, ThreadStacks};
pub use error::{GraphError, Result};
pub use events::{
    DropReason, EventBus, GraphEvent, WatchConfig, WatchFilter, WatchHandle, WatcherId,
};
pub use query::GraphQuery;
pub use registry::SubscriptionRegistry;
pub use store::{GraphConfig, GraphSnapshot, GraphStore, PruneOptions, PruneResult};
pub use types::*;
