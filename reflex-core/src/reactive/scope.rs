//! Owner scopes.
//!
//! A scope is a graph node with no value and no computation. Nodes created
//! inside [`Scope::run`] are owned by it and disposed together with it.

use super::runtime::{Runtime, RuntimeRef};
use crate::error::Result;
use crate::graph::{Node, NodeId, NodeKind};

/// A manually managed owner.
///
/// # Example
///
/// ```rust
/// use reflex_core::Runtime;
///
/// let rt = Runtime::new();
/// let scope = rt.create_scope();
/// let signal = scope.run(|| rt.signal(1));
///
/// scope.dispose().unwrap();
/// assert!(signal.is_disposed());
/// ```
#[derive(Clone, Debug)]
pub struct Scope {
    id: NodeId,
    rt: RuntimeRef,
}

impl Scope {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run `f` untracked with this scope adopting the nodes it creates.
    ///
    /// If the runtime has been dropped, `f` still runs, with no owner.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        self.rt.with_owner(Some(self.id), f)
    }

    /// Register a cleanup that runs when the scope is disposed.
    pub fn on_dispose<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        self.rt.on_dispose_of(self.id, cleanup);
    }

    pub fn is_disposed(&self) -> bool {
        !self.rt.is_alive(self.id)
    }

    /// Dispose every owned node, most recent first, then the scope itself.
    pub fn dispose(&self) -> Result<()> {
        self.rt.dispose(self.id)
    }
}

impl Runtime {
    /// Create a scope owned by the current owner.
    pub fn create_scope(&self) -> Scope {
        Scope {
            id: self.create_node(Node::new(NodeKind::Scope)),
            rt: self.downgrade(),
        }
    }
}
