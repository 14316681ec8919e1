//! Garbage Collector
//!
//! Mark-and-sweep over one or more graphs.
//!
//! # Algorithm
//!
//! 1. Seed a queue with the root keys (retained entities and watcher
//!    subjects).
//! 2. Breadth-first, pop a key, look it up in every graph, and enqueue each
//!    referenced key not yet marked. A key is marked before it is enqueued,
//!    so cycles are walked once.
//! 3. Sweep every graph, dropping entities whose key was never marked.
//!
//! Roots that do not exist in any graph are still marked; they simply have
//! no outgoing edges.

use std::collections::{HashSet, VecDeque};

use super::entity::EntityKey;
use super::store::Graph;

/// Outcome of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Keys found reachable.
    pub marked: usize,
    /// Entities removed, summed over all graphs.
    pub removed: usize,
}

/// Collect every key reachable from `roots` through references in any of
/// `graphs`.
pub fn mark<I>(roots: I, graphs: &[&Graph]) -> HashSet<EntityKey>
where
    I: IntoIterator<Item = EntityKey>,
{
    let mut marked = HashSet::new();
    let mut queue = VecDeque::new();

    for root in roots {
        if marked.insert(root.clone()) {
            queue.push_back(root);
        }
    }

    while let Some(key) = queue.pop_front() {
        for graph in graphs {
            let Some(entity) = graph.get(&key) else {
                continue;
            };
            for next in entity.references() {
                if marked.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
    }

    marked
}

/// Remove every entity of `graph` that is not in `marked`.
pub fn sweep(graph: &mut Graph, marked: &HashSet<EntityKey>) -> usize {
    graph.retain(|key| marked.contains(key))
}

/// Mark from `roots` across all graphs, then sweep each of them.
pub fn collect<I>(roots: I, graphs: &mut [&mut Graph]) -> GcStats
where
    I: IntoIterator<Item = EntityKey>,
{
    let marked = {
        let views: Vec<&Graph> = graphs.iter().map(|graph| &**graph).collect();
        mark(roots, &views)
    };
    let removed = graphs.iter_mut().map(|graph| sweep(graph, &marked)).sum();

    GcStats {
        marked: marked.len(),
        removed,
    }
}
