//! Graph construction from lifecycle callbacks.
//!
//! The host's hook dispatcher calls into a [`Plugin`] before and after every
//! subscribe, next, error, complete, and unsubscribe. [`GraphBuilder`] is the
//! plugin that turns that interleaved callback sequence into graph edges:
//!
//! - a subscribe nested inside another subscription's *subscribe* makes the
//!   new subscription a source of the enclosing one;
//! - a subscribe nested inside another subscription's *notification* makes
//!   the new subscription a merge of the notifying one;
//! - a subscribe with nothing active is a root.

mod graph;
mod plugin;

pub use graph::GraphBuilder;
pub use plugin::Plugin;
