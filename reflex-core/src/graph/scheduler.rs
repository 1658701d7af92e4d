//! Effect Scheduler
//!
//! Holds the effects waiting to run and the state of the current flush pass.
//!
//! # Ordering
//!
//! Effects run in the order their staleness was first discovered. The
//! staleness walk is breadth-first from the written node, and an effect that
//! is already pending keeps its original position when it is reached again.
//! Writes made by effects during a pass append to the same queue, so one pass
//! is transitively closed.
//!
//! The queue holds `(effect, ticket)` pairs and `pending` maps each queued
//! effect to its live ticket. Cancelling only drops the ticket; the stale
//! queue entry is skipped when popped.

use std::collections::VecDeque;

use indexmap::IndexMap;

use super::node::NodeId;

/// Pending effects plus flush and batch bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct EffectScheduler {
    /// Effects waiting to run, in first-discovery order.
    queue: VecDeque<(NodeId, u64)>,

    /// Live ticket of every queued effect.
    pending: IndexMap<NodeId, u64>,

    next_ticket: u64,

    /// Whether a flush pass is running.
    flushing: bool,

    /// Nesting depth of open batches.
    batch_depth: usize,
}

impl EffectScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue an effect. Already-queued effects keep their position.
    pub(crate) fn schedule(&mut self, effect: NodeId) {
        if self.pending.contains_key(&effect) {
            return;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(effect, ticket);
        self.queue.push_back((effect, ticket));
    }

    /// Drop a queued effect, e.g. because it was disposed.
    pub(crate) fn cancel(&mut self, effect: NodeId) {
        self.pending.swap_remove(&effect);
    }

    /// Take the next effect to run.
    pub(crate) fn pop_front(&mut self) -> Option<NodeId> {
        while let Some((effect, ticket)) = self.queue.pop_front() {
            if self.pending.get(&effect) == Some(&ticket) {
                self.pending.swap_remove(&effect);
                return Some(effect);
            }
        }
        None
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(crate) fn is_pending(&self, effect: NodeId) -> bool {
        self.pending.contains_key(&effect)
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub(crate) fn set_flushing(&mut self, flushing: bool) {
        self.flushing = flushing;
    }

    pub(crate) fn open_batch(&mut self) {
        self.batch_depth += 1;
    }

    pub(crate) fn close_batch(&mut self) {
        self.batch_depth = self
            .batch_depth
            .checked_sub(1)
            .expect("closed a batch that was never opened");
    }

    pub(crate) fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Whether a write may start a flush right away.
    pub(crate) fn can_flush(&self) -> bool {
        !self.flushing && self.batch_depth == 0 && !self.pending.is_empty()
    }
}
