//! Error types for graph tracking.

use crate::types::{Phase, RefId};
use thiserror::Error;

/// Main error type for graph operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown reference: {0}")]
    UnknownReference(RefId),

    #[error("Cycle detected while walking from {start} (revisited {at})")]
    CycleDetected { start: RefId, at: RefId },

    #[error("Traversal from {start} exceeded depth limit {limit}")]
    DepthExceeded { start: RefId, limit: usize },

    #[error("Out-of-order callback: pop of {phase:?} frame for {reference}, top was {found:?}")]
    OutOfOrderCallback {
        reference: RefId,
        phase: Phase,
        found: Option<(RefId, Phase)>,
    },

    #[error("Record faulted by an earlier ordering violation: {0}")]
    RecordFaulted(RefId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
