//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is scheduled and re-runs in
//!    the next flush pass. An effect that was only reached transitively
//!    first checks whether anything it read actually changed.
//!
//! 3. Before re-running, the effect disposes what it created last time,
//!    runs its cleanups and clears its old dependencies.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run in flush).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects register cleanups with [`Runtime::on_dispose`] while they run.
//! Cleanups are called before the effect re-runs and when it is stopped.

use std::any::Any;

use tracing::debug;

use super::or_panic;
use super::runtime::{Runtime, RuntimeRef};
use crate::error::{BoxError, Result};
use crate::graph::{ComputeResult, Node, NodeId, NodeKind};

/// Options for [`Runtime::create_effect_with_options`].
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Debug name, reported with failures.
    pub name: Option<String>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Handle to a running effect.
///
/// Dropping the handle does not stop the effect; it lives until
/// [`Effect::stop`] is called or its owner is disposed.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use reflex_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = rt.create_effect({
///     let (count, log) = (count.clone(), log.clone());
///     move || log.borrow_mut().push(count.get())
/// });
///
/// count.set(5);
/// effect.stop().unwrap();
/// count.set(6);
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    rt: RuntimeRef,
}

impl Effect {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Dispose the effect and everything it owns, running its cleanups.
    ///
    /// A pending run is cancelled. Stopping twice fails with
    /// `ReactiveError::Disposed`; stopping again from one of the effect's own
    /// cleanups is a no-op.
    pub fn stop(&self) -> Result<()> {
        self.rt.dispose(self.id)
    }

    pub fn is_stopped(&self) -> bool {
        !self.rt.is_alive(self.id)
    }

    /// Number of times the body has run.
    pub fn run_count(&self) -> Result<u64> {
        self.rt.run_count(self.id)
    }

    pub fn name(&self) -> Option<String> {
        self.rt.node_name(self.id)
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.rt.ptr_eq(&other.rt)
    }
}

impl Eq for Effect {}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Runtime {
    /// Create an effect and run it once.
    ///
    /// # Panics
    ///
    /// Panics if the first run fails, which for an infallible body only
    /// happens through an engine error such as a cycle.
    #[track_caller]
    pub fn create_effect<F>(&self, f: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        self.create_effect_with_options(EffectOptions::default(), f)
    }

    #[track_caller]
    pub fn create_effect_with_options<F>(&self, options: EffectOptions, mut f: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        or_panic(self.try_create_effect_with_options(options, move || {
            f();
            Ok(())
        }))
    }

    /// Create an effect whose body may fail.
    ///
    /// If the first run fails, the effect is disposed and the failure is
    /// returned as `ReactiveError::EffectExecution`. Later failures are
    /// collected by the flush pass that ran the effect.
    pub fn try_create_effect<F>(&self, f: F) -> Result<Effect>
    where
        F: FnMut() -> std::result::Result<(), BoxError> + 'static,
    {
        self.try_create_effect_with_options(EffectOptions::default(), f)
    }

    pub fn try_create_effect_with_options<F>(
        &self,
        options: EffectOptions,
        mut f: F,
    ) -> Result<Effect>
    where
        F: FnMut() -> std::result::Result<(), BoxError> + 'static,
    {
        let node = Node::new(NodeKind::Effect)
            .with_compute(Box::new(move |_: Option<&dyn Any>| -> ComputeResult {
                f()?;
                Ok(None)
            }))
            .with_name(options.name);
        let id = self.create_node(node);

        if let Err(err) = self.start_effect(id) {
            debug!(effect = %id, "effect failed on creation, disposing it");
            if self.is_alive(id) {
                self.dispose(id, true)?;
            }
            return Err(err);
        }

        Ok(Effect {
            id,
            rt: self.downgrade(),
        })
    }
}
