//! Live feed of graph changes.
//!
//! Watchers (consoles, exporters, visualizers) receive every structural change
//! made to the graph as it happens:
//! - Records created
//! - Source and merge edges added
//! - Terminations, faults, and pruning
//!
//! Delivery never blocks the instrumented pipeline. Each watcher has a bounded
//! buffer; a watcher that falls behind is dropped.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.events().watch(WatchConfig::default());
//!
//! while let Ok(event) = handle.try_recv() {
//!     match event {
//!         GraphEvent::SourceAdded { source, destination } => println!("{source} -> {destination}"),
//!         GraphEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{DropReason, GraphEvent, WatchConfig, WatchFilter, WatchHandle, WatcherId};
