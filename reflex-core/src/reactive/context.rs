//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a node is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Running a memo or effect pushes a
//! frame for it; the frame is popped when the returned guard drops. Untracked
//! sections and explicit owner sections push frames with no listener.
//!
//! A frame carries two things that usually coincide:
//!
//! - the *listener*, which records dependencies for reads
//! - the *owner*, which adopts nodes created while the frame is active

use std::cell::RefCell;

use crate::graph::NodeId;

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    /// Computation recording dependencies, if any.
    pub(crate) listener: Option<NodeId>,
    /// Node adopting newly created nodes, if any.
    pub(crate) owner: Option<NodeId>,
}

impl Frame {
    /// Frame for a running computation: it both listens and owns.
    pub(crate) fn computation(id: NodeId) -> Self {
        Self {
            listener: Some(id),
            owner: Some(id),
        }
    }

    /// Frame that records no dependencies but keeps an owner.
    pub(crate) fn untracked(owner: Option<NodeId>) -> Self {
        Self {
            listener: None,
            owner,
        }
    }
}

/// The reactive context stack.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether any computation is executing, even below untracked frames.
    pub(crate) fn is_computing(&self) -> bool {
        self.frames.iter().any(|frame| frame.listener.is_some())
    }

    /// The computation currently recording dependencies, if any.
    pub(crate) fn listener(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.listener)
    }

    /// The node that adopts newly created nodes, if any.
    pub(crate) fn owner(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.owner)
    }

    /// Whether `id` is executing somewhere on the stack.
    pub(crate) fn is_running(&self, id: NodeId) -> bool {
        self.frames.iter().any(|frame| frame.listener == Some(id))
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub(crate) struct ContextGuard<'a> {
    stack: &'a RefCell<ContextStack>,
    frame: Frame,
}

impl<'a> ContextGuard<'a> {
    /// Enter a new frame. It is exited when the returned guard is dropped.
    pub(crate) fn enter(stack: &'a RefCell<ContextStack>, frame: Frame) -> Self {
        stack.borrow_mut().push(frame);
        Self { stack, frame }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.borrow_mut().pop();

        // Verify we're popping the right frame.
        // This helps catch bugs where frames are mismatched.
        debug_assert_eq!(
            popped,
            Some(self.frame),
            "ContextGuard mismatch: expected {:?}, got {:?}",
            self.frame,
            popped
        );
    }
}
