//! Bounded walks over a record map.

use crate::error::{GraphError, Result};
use crate::types::{GraphRecord, RefId, Reference};
use std::collections::{HashMap, HashSet};

type Records = HashMap<RefId, GraphRecord>;

fn record(records: &Records, id: RefId) -> Result<&GraphRecord> {
    records.get(&id).ok_or(GraphError::UnknownReference(id))
}

/// References visited by following `destination` from `start`, nearest first.
///
/// Stops at the first record with no destination, or at a destination whose
/// record has been pruned (that destination is still included).
pub fn destination_chain(records: &Records, start: RefId, limit: usize) -> Result<Vec<Reference>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::from([start]);
    let mut current = record(records, start)?;

    while let Some(next) = &current.destination {
        if !visited.insert(next.id) {
            tracing::warn!(%start, at = %next.id, "destination cycle");
            return Err(GraphError::CycleDetected { start, at: next.id });
        }
        if chain.len() >= limit {
            return Err(GraphError::DepthExceeded { start, limit });
        }
        chain.push(next.clone());
        match records.get(&next.id) {
            Some(r) => current = r,
            None => break,
        }
    }

    Ok(chain)
}

/// Terminal reference of the destination chain, or `None` if `start` has no
/// destination of its own.
pub fn final_destination(records: &Records, start: RefId, limit: usize) -> Result<Option<Reference>> {
    Ok(destination_chain(records, start, limit)?.pop())
}

/// Every transitive source of `start`, depth-first in discovery order.
pub fn all_sources(records: &Records, start: RefId, limit: usize) -> Result<Vec<Reference>> {
    let mut found = Vec::new();
    walk_sources(records, start, limit, |source| {
        found.push(source.clone());
        false
    })?;
    Ok(found)
}

/// True iff `candidate` is a direct or transitive source of `start`.
pub fn has_source(records: &Records, start: RefId, candidate: RefId, limit: usize) -> Result<bool> {
    walk_sources(records, start, limit, |source| source.id == candidate)
}

/// Depth-first walk over sources; `visit` returns true to stop early.
///
/// A source reachable along several paths is visited once. Only a source
/// that reappears on its own upstream path is a cycle.
fn walk_sources(
    records: &Records,
    start: RefId,
    limit: usize,
    mut visit: impl FnMut(&Reference) -> bool,
) -> Result<bool> {
    enum Step<'r> {
        Enter(&'r Reference),
        Leave(RefId),
    }

    let root = record(records, start)?;
    let mut visited = HashSet::from([start]);
    let mut on_path = HashSet::from([start]);
    let mut stack: Vec<Step<'_>> = root.sources.iter().rev().map(Step::Enter).collect();
    let mut steps = 0usize;

    while let Some(step) = stack.pop() {
        let source = match step {
            Step::Enter(source) => source,
            Step::Leave(id) => {
                on_path.remove(&id);
                continue;
            }
        };
        if on_path.contains(&source.id) {
            tracing::warn!(%start, at = %source.id, "source cycle");
            return Err(GraphError::CycleDetected { start, at: source.id });
        }
        if !visited.insert(source.id) {
            continue;
        }
        steps += 1;
        if steps > limit {
            return Err(GraphError::DepthExceeded { start, limit });
        }
        if visit(source) {
            return Ok(true);
        }
        if let Some(r) = records.get(&source.id) {
            on_path.insert(source.id);
            stack.push(Step::Leave(source.id));
            stack.extend(r.sources.iter().rev().map(Step::Enter));
        }
    }

    Ok(false)
}
