//! Read-side graph queries.
//!
//! Nothing here mutates the store. Every query runs against one consistent
//! view of the records and is bounded: walks keep a visited set and report
//! [`GraphError::CycleDetected`](crate::GraphError::CycleDetected) instead of
//! looping, and give up with `DepthExceeded` past the configured limit.
//!
//! Records referenced by an edge but already pruned are treated as "no
//! further information": the walk stops there.

mod graph_query;
mod traversal;

pub use graph_query::GraphQuery;
pub use traversal::{all_sources, destination_chain, final_destination, has_source};
