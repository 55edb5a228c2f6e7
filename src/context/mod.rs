//! Context tracking for edge inference.
//!
//! Lifecycle callbacks arrive nested: a subscribe made while another
//! subscription is still setting up happens *inside* that subscription's
//! subscribe call, and a subscribe made while a value is being delivered
//! happens *inside* that delivery. The context stack records this nesting
//! explicitly as frames of `(reference, phase)` so the builder can ask
//! "who is active right now, and doing what?" without relying on the host's
//! native call stack.
//!
//! Each OS thread gets its own stack; callbacks from one logical pipeline
//! are expected to arrive on a single thread in strict call order.

mod stack;

pub use stack::{ContextStack, Frame, ThreadStacks};
