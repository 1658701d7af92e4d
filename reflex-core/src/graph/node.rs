//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::error::BoxError;

/// Unique identifier for a node in the dependency graph.
///
/// The index addresses an arena slot; the generation tells apart successive
/// occupants of the same slot, so a handle to a disposed node never resolves
/// to whatever was allocated there afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot of this node.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this node was allocated.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Signal,

    /// A derived node (memo). These have dependencies and may have dependents.
    /// They cache their computed value and recompute lazily.
    Memo,

    /// An effect node. These are leaves of the graph.
    /// They run eagerly within a flush pass.
    Effect,

    /// An owner with no value and no computation. Groups nodes whose
    /// lifetime is managed by hand.
    Scope,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. Something upstream changed,
    /// but none of its direct sources is known to hold a new value yet.
    MaybeDirty,

    /// The node definitely needs to recompute. A direct source changed.
    Dirty,
}

/// Outcome of one execution: the new value, or `None` for computations that
/// hold no value (effects).
pub(crate) type ComputeResult = Result<Option<Box<dyn Any>>, BoxError>;

/// Type-erased computation body. Receives the previous value, if any.
pub(crate) type ComputeFn = dyn FnMut(Option<&dyn Any>) -> ComputeResult;

/// Shared handle to a computation body.
pub(crate) type ComputeHandle = Rc<RefCell<Box<ComputeFn>>>;

/// Type-erased equality check between two values of the same node.
pub(crate) type EqualsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Erase a typed equality function.
pub(crate) fn erase_equals<T: 'static>(equals: Rc<dyn Fn(&T, &T) -> bool>) -> EqualsFn {
    Rc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => equals(a, b),
            _ => false,
        }
    })
}

/// A node in the dependency graph.
pub(crate) struct Node {
    /// What kind of node this is.
    pub(crate) kind: NodeKind,

    /// Current dirty state. Signals and scopes stay clean.
    pub(crate) state: DirtyState,

    /// Last computed or assigned value.
    pub(crate) value: Option<Box<dyn Any>>,

    /// Computation body; absent for signals and scopes.
    pub(crate) compute: Option<ComputeHandle>,

    /// Equality used to suppress notifications for unchanged values.
    pub(crate) equals: Option<EqualsFn>,

    /// Nodes read during the last execution, in read order.
    pub(crate) sources: SmallVec<[NodeId; 4]>,

    /// Computations that read this node.
    pub(crate) observers: IndexSet<NodeId>,

    /// The computation or scope that created this node.
    pub(crate) owner: Option<NodeId>,

    /// Nodes created while this node was the active owner.
    pub(crate) owned: Vec<NodeId>,

    /// Teardown callbacks, run in reverse order.
    pub(crate) cleanups: Vec<Box<dyn FnOnce()>>,

    /// Debug name.
    pub(crate) name: Option<String>,

    /// Number of times the computation body was executed.
    pub(crate) runs: u64,

    /// Set once disposal starts; the node no longer re-executes.
    pub(crate) disposing: bool,
}

impl Node {
    /// Create a new node with the given kind.
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: match kind {
                NodeKind::Signal | NodeKind::Scope => DirtyState::Clean,
                // Start dirty to ensure first computation
                NodeKind::Memo | NodeKind::Effect => DirtyState::Dirty,
            },
            value: None,
            compute: None,
            equals: None,
            sources: SmallVec::new(),
            observers: IndexSet::new(),
            owner: None,
            owned: Vec::new(),
            cleanups: Vec::new(),
            name: None,
            runs: 0,
            disposing: false,
        }
    }

    pub(crate) fn with_value(mut self, value: Option<Box<dyn Any>>) -> Self {
        self.value = value;
        self
    }

    pub(crate) fn with_compute(mut self, compute: Box<ComputeFn>) -> Self {
        self.compute = Some(Rc::new(RefCell::new(compute)));
        self
    }

    pub(crate) fn with_equals(mut self, equals: Option<EqualsFn>) -> Self {
        self.equals = equals;
        self
    }

    pub(crate) fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Whether this node runs a computation.
    pub(crate) fn is_computation(&self) -> bool {
        self.compute.is_some()
    }

    /// Mark the node as maybe dirty (something upstream might have changed).
    pub(crate) fn mark_maybe_dirty(&mut self) {
        if self.state == DirtyState::Clean {
            self.state = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub(crate) fn mark_dirty(&mut self) {
        self.state = DirtyState::Dirty;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .field("owner", &self.owner)
            .field("owned", &self.owned.len())
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}
