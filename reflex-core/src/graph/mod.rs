//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A reads B, B lists A as an observer and
//!   A lists B as a source
//! - A separate owner tree records which computation created which node, so
//!   disposal can walk it
//!
//! When a signal changes, we traverse the graph breadth-first to find all
//! affected nodes and mark them. Direct observers become dirty, everything
//! further downstream becomes maybe-dirty. Computations then settle lazily
//! when they are read.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a generational arena, so edges are plain ids and
//!    disposal frees slots instead of breaking reference cycles.
//!
//! 2. We maintain both forward (sources) and reverse (observers) edges
//!    and keep them mutually consistent on every mutation.

mod arena;
mod node;
mod scheduler;

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::error::{ReactiveError, Result};

pub(crate) use arena::Arena;
pub(crate) use node::{erase_equals, ComputeFn, ComputeResult, Node};
pub use node::{DirtyState, NodeId, NodeKind};
pub(crate) use scheduler::EffectScheduler;

/// A node reached by a staleness walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StaleMark {
    pub(crate) node: NodeId,
    /// Whether the node reads the written node directly.
    pub(crate) direct: bool,
}

/// The dependency graph: node storage plus edge and ownership bookkeeping.
pub(crate) struct Graph {
    nodes: Arena<Node>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Arena::new(),
        }
    }

    /// Add a node, linking it under `owner` when given.
    pub(crate) fn insert(&mut self, mut node: Node, owner: Option<NodeId>) -> NodeId {
        let owner = owner.filter(|owner| self.nodes.contains(*owner));
        node.owner = owner;
        let id = self.nodes.insert(node);
        if let Some(owner) = owner.and_then(|owner| self.nodes.get_mut(owner)) {
            owner.owned.push(id);
        }
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(ReactiveError::Disposed { node: id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(ReactiveError::Disposed { node: id })
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Record that `observer` read `source`.
    ///
    /// Repeated reads within one execution record a single edge.
    pub(crate) fn add_edge(&mut self, source: NodeId, observer: NodeId) {
        if source == observer || !self.nodes.contains(source) {
            return;
        }
        let Some(observer_node) = self.nodes.get_mut(observer) else {
            return;
        };
        if observer_node.sources.contains(&source) {
            return;
        }
        observer_node.sources.push(source);
        if let Some(source_node) = self.nodes.get_mut(source) {
            source_node.observers.insert(observer);
        }
    }

    /// Drop every source edge of `id`, before it re-executes.
    pub(crate) fn detach_sources(&mut self, id: NodeId) {
        let sources = match self.nodes.get_mut(id) {
            Some(node) => std::mem::take(&mut node.sources),
            None => return,
        };
        for source in sources {
            if let Some(source_node) = self.nodes.get_mut(source) {
                source_node.observers.shift_remove(&id);
            }
        }
    }

    /// Remove a node, unlinking it from sources, observers and its owner.
    ///
    /// Owned children are left in place with no owner.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.detach_sources(id);
        let node = self.nodes.remove(id)?;

        for observer in &node.observers {
            if let Some(observer_node) = self.nodes.get_mut(*observer) {
                observer_node.sources.retain(|source| *source != id);
            }
        }
        if let Some(owner) = node.owner.and_then(|owner| self.nodes.get_mut(owner)) {
            owner.owned.retain(|child| *child != id);
        }
        for child in &node.owned {
            if let Some(child) = self.nodes.get_mut(*child) {
                child.owner = None;
            }
        }
        Some(node)
    }

    /// Collect every computation downstream of `source`, breadth-first.
    ///
    /// Each reachable node appears exactly once, in first-discovery order.
    /// Nothing is mutated, so the caller can reject the write first.
    pub(crate) fn collect_stale(&self, source: NodeId) -> Vec<StaleMark> {
        let mut marks = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        // Start with the source node's direct dependents
        if let Some(source) = self.nodes.get(source) {
            for observer in &source.observers {
                queue.push_back((*observer, true));
            }
        }

        while let Some((node_id, direct)) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            marks.push(StaleMark {
                node: node_id,
                direct,
            });

            // Propagate to dependents
            for observer in &node.observers {
                queue.push_back((*observer, false));
            }
        }

        trace!(source = %source, reached = marks.len(), "collected stale nodes");
        marks
    }

    /// Apply marks from [`Graph::collect_stale`].
    ///
    /// Returns the effects among them, in walk order.
    pub(crate) fn apply_marks(&mut self, marks: &[StaleMark]) -> Vec<NodeId> {
        let mut effects = Vec::new();
        for mark in marks {
            let Some(node) = self.nodes.get_mut(mark.node) else {
                continue;
            };
            if mark.direct {
                node.mark_dirty();
            } else {
                node.mark_maybe_dirty();
            }
            if node.kind == NodeKind::Effect {
                effects.push(mark.node);
            }
        }
        effects
    }

    /// Mark the direct observers of `id` dirty after its value changed.
    ///
    /// Returns the effects that were clean before, which nobody has
    /// scheduled yet.
    pub(crate) fn mark_observers_dirty(&mut self, id: NodeId) -> Vec<NodeId> {
        let observers: Vec<NodeId> = match self.nodes.get(id) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return Vec::new(),
        };
        let mut unscheduled = Vec::new();
        for observer in observers {
            if let Some(node) = self.nodes.get_mut(observer) {
                if node.kind == NodeKind::Effect && node.state == DirtyState::Clean {
                    unscheduled.push(observer);
                }
                node.mark_dirty();
            }
        }
        unscheduled
    }
}
