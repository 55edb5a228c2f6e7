//! Subscription identity registry.
//!
//! Assigns a stable [`Reference`](crate::Reference) to every
//! observable/subscriber pair the first time it is seen and returns the same
//! reference on every later lookup for that pair. The graph core only needs
//! the resulting references; hosts with their own identity scheme can build
//! references directly instead.

mod manager;

pub use manager::SubscriptionRegistry;
