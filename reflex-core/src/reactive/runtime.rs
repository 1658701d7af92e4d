//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the context stack and the effect
//! scheduler, and implements every graph operation.
//!
//! # How It Works
//!
//! 1. When a node is created, it is stored in the graph and adopted by the
//!    current owner.
//!
//! 2. When a memo or effect reads a node, the runtime records the edge.
//!    Edges are rebuilt from scratch on every execution.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Walks all dependents breadth-first, rejecting the write if one of
//!       them is still executing
//!    b. Marks direct dependents dirty and the rest maybe-dirty
//!    c. Schedules the effects it reached
//!    d. Memos are lazy - they settle on next access
//!
//! 4. Unless a flush or batch is already open, the write then runs every
//!    scheduled effect before returning.
//!
//! # Handles
//!
//! Signal, memo, effect and scope handles hold a weak [`RuntimeRef`], so
//! closures stored in the graph that capture handles do not keep the runtime
//! alive. Once every [`Runtime`] clone is dropped, the graph is freed and
//! handle operations fail with `ReactiveError::Disposed`.
//!
//! # Threading
//!
//! A runtime is single-threaded: handles are `!Send` and every operation
//! runs to completion before returning. Separate runtimes are fully
//! independent.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use super::context::{ContextGuard, ContextStack, Frame};
use crate::config::RuntimeConfig;
use crate::error::{EffectFailure, ReactiveError, Result};
use crate::graph::{ComputeFn, DirtyState, EffectScheduler, Graph, Node, NodeId, NodeKind};

struct Inner {
    graph: RefCell<Graph>,
    context: RefCell<ContextStack>,
    scheduler: RefCell<EffectScheduler>,
    config: RuntimeConfig,
}

/// Handle to a reactive runtime.
///
/// Cloning is cheap; clones share the same graph.
///
/// # Example
///
/// ```rust
/// use reflex_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let doubled = rt.create_memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                graph: RefCell::new(Graph::new()),
                context: RefCell::new(ContextStack::new()),
                scheduler: RefCell::new(EffectScheduler::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point to the same runtime.
    pub fn same_runtime(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> RuntimeRef {
        RuntimeRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().len()
    }

    /// Whether `id` refers to a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.inner.graph.borrow().contains(id)
    }

    /// Current dirty state of a node.
    pub fn state_of(&self, id: NodeId) -> Result<DirtyState> {
        Ok(self.inner.graph.borrow().node(id)?.state)
    }

    pub fn kind_of(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.inner.graph.borrow().node(id)?.kind)
    }

    /// The node that owns `id`, if any.
    pub fn owner_of(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.inner.graph.borrow().node(id)?.owner)
    }

    /// Nodes read by the last execution of `id`, in read order.
    pub fn sources_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.inner.graph.borrow().node(id)?.sources.to_vec())
    }

    /// Computations that currently depend on `id`.
    pub fn observers_of(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .inner
            .graph
            .borrow()
            .node(id)?
            .observers
            .iter()
            .copied()
            .collect())
    }

    /// The node that would adopt a node created right now.
    pub fn current_owner(&self) -> Option<NodeId> {
        self.inner.context.borrow().owner()
    }

    /// Whether reads are currently recorded as dependencies.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.borrow().listener().is_some()
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.scheduler.borrow().in_batch()
    }

    /// Whether `effect` is waiting for the next flush.
    pub fn is_scheduled(&self, effect: NodeId) -> bool {
        self.inner.scheduler.borrow().is_pending(effect)
    }

    /// Register `cleanup` against the current owner.
    ///
    /// Cleanups run in reverse registration order before the owner
    /// re-executes and when it is disposed. Outside of any owner this is
    /// a no-op.
    pub fn on_dispose<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        let Some(owner) = self.current_owner() else {
            trace!("on_dispose called outside of any owner, ignored");
            return;
        };
        if let Ok(node) = self.inner.graph.borrow_mut().node_mut(owner) {
            node.cleanups.push(Box::new(cleanup));
        }
    }

    /// Run `f` without recording dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let owner = self.current_owner();
        let _frame = ContextGuard::enter(&self.inner.context, Frame::untracked(owner));
        f()
    }

    /// Run `f` untracked, with `owner` adopting every node it creates.
    pub fn with_owner<R>(&self, owner: Option<NodeId>, f: impl FnOnce() -> R) -> R {
        let _frame = ContextGuard::enter(&self.inner.context, Frame::untracked(owner));
        f()
    }

    /// Run `f` with flushing deferred until the outermost batch returns.
    ///
    /// Returns the failures of the flush that closes the batch, if any.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let output = {
            let _batch = BatchGuard::enter(&self.inner.scheduler);
            f()
        };
        self.flush_if_idle()?;
        Ok(output)
    }

    /// Run every pending effect now.
    ///
    /// Inside a running flush pass this is a no-op: the running pass
    /// already picks up everything scheduled.
    pub fn flush_sync(&self) -> Result<()> {
        {
            let scheduler = self.inner.scheduler.borrow();
            if scheduler.is_flushing() || !scheduler.has_pending() {
                return Ok(());
            }
        }
        self.flush()
    }

    /// Dispose a node.
    ///
    /// Unlinks it from its sources, runs its cleanups and frees it. With
    /// `dispose_children`, every node it owns is disposed before the
    /// cleanups run, most recent first; otherwise those nodes are orphaned.
    ///
    /// Once disposal starts the node never re-executes, even if one of its
    /// cleanups writes a signal it used to read.
    pub fn dispose(&self, id: NodeId, dispose_children: bool) -> Result<()> {
        if !self.is_alive(id) {
            return Err(ReactiveError::Disposed { node: id });
        }
        self.dispose_node(id, dispose_children);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Engine internals
    // ------------------------------------------------------------------------

    /// Store a node under the current owner.
    pub(crate) fn create_node(&self, node: Node) -> NodeId {
        let owner = self.current_owner();
        let kind = node.kind;
        let id = self.inner.graph.borrow_mut().insert(node, owner);
        trace!(node = %id, ?kind, owner = ?owner, "node created");
        id
    }

    /// Read a node's value, settling it first.
    pub(crate) fn read<T: Clone + 'static>(&self, id: NodeId, tracked: bool) -> Result<T> {
        self.refresh(id)?;
        if tracked {
            self.track(id);
        }
        let value = {
            let graph = self.inner.graph.borrow();
            let node = graph.node(id)?;
            node.value
                .as_ref()
                .and_then(|value| value.downcast_ref::<T>())
                .cloned()
        };
        // A node without a value is mid-teardown
        let value = value.ok_or(ReactiveError::Disposed { node: id })?;
        self.flush_after_read();
        Ok(value)
    }

    /// Assign a signal's value and propagate staleness.
    pub(crate) fn write(&self, id: NodeId, next: Box<dyn Any>) -> Result<()> {
        let (prev, equals) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            (node.value.take(), node.equals.clone())
        };

        let unchanged = match (&prev, &equals) {
            (Some(prev), Some(equals)) => equals(&**prev, &*next),
            _ => false,
        };
        if unchanged {
            self.restore_value(id, prev);
            return Ok(());
        }

        let marks = self.inner.graph.borrow().collect_stale(id);
        let running = {
            let context = self.inner.context.borrow();
            marks
                .iter()
                .find(|mark| context.is_running(mark.node))
                .map(|mark| mark.node)
        };
        if let Some(node) = running {
            self.restore_value(id, prev);
            return Err(ReactiveError::CyclicDependency { node });
        }

        let effects = {
            let mut graph = self.inner.graph.borrow_mut();
            if let Ok(node) = graph.node_mut(id) {
                node.value = Some(next);
            }
            graph.apply_marks(&marks)
        };
        trace!(node = %id, stale = marks.len(), effects = effects.len(), "signal written");
        {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            for effect in effects {
                scheduler.schedule(effect);
            }
        }
        drop(prev);

        self.flush_if_idle()
    }

    /// Bring a computation up to date.
    ///
    /// Maybe-dirty nodes settle their sources in read order and only
    /// recompute once one of them turns out to have changed.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<()> {
        let (state, sources) = {
            let graph = self.inner.graph.borrow();
            let node = graph.node(id)?;
            if !node.is_computation() || node.disposing {
                return Ok(());
            }
            (node.state, node.sources.clone())
        };
        if self.inner.context.borrow().is_running(id) {
            return Err(ReactiveError::CyclicDependency { node: id });
        }
        if state == DirtyState::Clean {
            return Ok(());
        }

        if state == DirtyState::MaybeDirty {
            for source in sources {
                if !self.is_alive(source) {
                    continue;
                }
                self.refresh(source)?;
                if self.state_of(id)? == DirtyState::Dirty {
                    break;
                }
            }
        }

        match self.state_of(id)? {
            DirtyState::Dirty => self.recompute(id),
            DirtyState::MaybeDirty => {
                self.inner.graph.borrow_mut().node_mut(id)?.state = DirtyState::Clean;
                Ok(())
            }
            DirtyState::Clean => Ok(()),
        }
    }

    /// Re-execute a computation, rebuilding its sources.
    ///
    /// On failure the previous value is kept and the node stays stale, so
    /// the next read retries.
    fn recompute(&self, id: NodeId) -> Result<()> {
        self.teardown(id, true)?;

        let (compute, equals, prev) = {
            let mut graph = self.inner.graph.borrow_mut();
            graph.detach_sources(id);
            let node = graph.node_mut(id)?;
            let Some(compute) = node.compute.clone() else {
                return Ok(());
            };
            node.runs += 1;
            (compute, node.equals.clone(), node.value.take())
        };

        trace!(node = %id, depth = self.inner.context.borrow().depth(), "recomputing");
        let result = {
            let _frame = ContextGuard::enter(&self.inner.context, Frame::computation(id));
            let mut guard = compute.borrow_mut();
            let body: &mut ComputeFn = &mut **guard;
            body(prev.as_deref())
        };

        let changed = match (&result, &prev, &equals) {
            (Ok(Some(next)), Some(prev), Some(equals)) => !equals(&**prev, &**next),
            (Ok(Some(_)), _, _) => true,
            _ => false,
        };

        let mut graph = self.inner.graph.borrow_mut();
        let Ok(node) = graph.node_mut(id) else {
            // Disposed by its own body
            trace!(node = %id, "computation disposed while running");
            return result
                .map(|_| ())
                .map_err(|err| ReactiveError::from_compute(id, err));
        };

        match result {
            Ok(next) => {
                node.state = DirtyState::Clean;
                node.value = match next {
                    Some(next) if changed => Some(next),
                    _ => prev,
                };
                let wake = if changed {
                    graph.mark_observers_dirty(id)
                } else {
                    Vec::new()
                };
                drop(graph);

                let mut scheduler = self.inner.scheduler.borrow_mut();
                for effect in wake {
                    scheduler.schedule(effect);
                }
                Ok(())
            }
            Err(err) => {
                node.value = prev;
                drop(graph);
                let err = ReactiveError::from_compute(id, err);
                debug!(node = %id, error = %err, "computation failed");
                Err(err)
            }
        }
    }

    /// Dispose owned children (most recent first), then run cleanups in
    /// reverse registration order.
    fn teardown(&self, id: NodeId, dispose_children: bool) -> Result<()> {
        let (owned, cleanups) = {
            let mut graph = self.inner.graph.borrow_mut();
            let node = graph.node_mut(id)?;
            (
                std::mem::take(&mut node.owned),
                std::mem::take(&mut node.cleanups),
            )
        };

        if dispose_children {
            for child in owned.into_iter().rev() {
                self.dispose_node(child, true);
            }
        } else {
            let mut graph = self.inner.graph.borrow_mut();
            for child in owned {
                if let Ok(child) = graph.node_mut(child) {
                    child.owner = None;
                }
            }
        }

        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        Ok(())
    }

    /// Detach, tear down and free a node, returning it.
    ///
    /// Returns `None` when the node is already gone or already being
    /// disposed further up the stack.
    fn dispose_node(&self, id: NodeId, dispose_children: bool) -> Option<Node> {
        {
            let mut graph = self.inner.graph.borrow_mut();
            match graph.node_mut(id) {
                Ok(node) if !node.disposing => {
                    node.disposing = true;
                    node.state = DirtyState::Clean;
                }
                _ => return None,
            }
            graph.detach_sources(id);
        }
        self.inner.scheduler.borrow_mut().cancel(id);

        if self.teardown(id, dispose_children).is_err() {
            return None;
        }

        let removed = self.inner.graph.borrow_mut().remove(id);
        if let Some(node) = &removed {
            debug!(node = %id, kind = ?node.kind, name = ?node.name, "node disposed");
        }
        removed
    }

    /// Dispose a node and hand back its last value.
    pub(crate) fn dispose_with_value<T: 'static>(&self, id: NodeId) -> Result<Option<T>> {
        if !self.is_alive(id) {
            return Err(ReactiveError::Disposed { node: id });
        }
        Ok(self
            .dispose_node(id, true)
            .and_then(|node| node.value)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value))
    }

    fn is_disposing(&self, id: NodeId) -> bool {
        self.inner
            .graph
            .borrow()
            .node(id)
            .is_ok_and(|node| node.disposing)
    }

    /// Record `id` as a source of the current listener.
    fn track(&self, id: NodeId) {
        let listener = self.inner.context.borrow().listener();
        if let Some(listener) = listener {
            self.inner.graph.borrow_mut().add_edge(id, listener);
        }
    }

    fn restore_value(&self, id: NodeId, value: Option<Box<dyn Any>>) {
        let mut graph = self.inner.graph.borrow_mut();
        if let Ok(node) = graph.node_mut(id) {
            node.value = value;
        }
    }

    pub(crate) fn run_count(&self, id: NodeId) -> Result<u64> {
        Ok(self.inner.graph.borrow().node(id)?.runs)
    }

    pub(crate) fn node_name(&self, id: NodeId) -> Option<String> {
        self.inner
            .graph
            .borrow()
            .node(id)
            .ok()
            .and_then(|node| node.name.clone())
    }

    /// First run of a freshly created effect.
    pub(crate) fn start_effect(&self, id: NodeId) -> Result<()> {
        let started = self.refresh(id).map_err(|err| {
            let failure = self.failure(id, err);
            self.report(&failure);
            ReactiveError::EffectExecution {
                failures: vec![failure],
            }
        });
        if let Err(err) = self.flush_if_idle() {
            // Each failure has already gone through `report`
            debug!(error = %err, "flush after effect creation failed");
        }
        started
    }

    // ------------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------------

    /// Start a flush unless a pass, a batch or a computation is running.
    fn flush_if_idle(&self) -> Result<()> {
        if self.inner.context.borrow().is_computing() {
            return Ok(());
        }
        if !self.inner.scheduler.borrow().can_flush() {
            return Ok(());
        }
        self.flush()
    }

    fn flush_after_read(&self) {
        if let Err(err) = self.flush_if_idle() {
            // Each failure has already gone through `report`
            debug!(error = %err, "flush after read failed");
        }
    }

    /// Run pending effects until the queue drains.
    fn flush(&self) -> Result<()> {
        let _flushing = FlushGuard::enter(&self.inner.scheduler);
        let limit = self.inner.config.max_flush_runs;
        let mut processed = 0usize;
        let mut failures = Vec::new();

        loop {
            let next = self.inner.scheduler.borrow_mut().pop_front();
            let Some(effect) = next else {
                break;
            };
            if !self.is_alive(effect) || self.is_disposing(effect) {
                continue;
            }

            processed += 1;
            if processed > limit {
                self.inner.scheduler.borrow_mut().clear();
                error!(limit, "flush pass exceeded its effect run limit");
                return Err(ReactiveError::FlushOverflow { limit });
            }

            if let Err(err) = self.refresh(effect) {
                let failure = self.failure(effect, err);
                self.report(&failure);
                failures.push(failure);
            }
        }

        debug!(processed, failed = failures.len(), "flush pass finished");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReactiveError::EffectExecution { failures })
        }
    }

    fn failure(&self, effect: NodeId, error: ReactiveError) -> EffectFailure {
        EffectFailure {
            effect,
            name: self.node_name(effect),
            error: Box::new(error),
        }
    }

    fn report(&self, failure: &EffectFailure) {
        error!(
            effect = %failure.effect,
            name = ?failure.name,
            error = %failure.error,
            "effect failed"
        );
        if let Some(hook) = &self.inner.config.on_effect_error {
            hook(failure);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("node_count", &self.node_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Non-owning reference to a runtime, held by node handles.
#[derive(Clone, Debug)]
pub(crate) struct RuntimeRef {
    inner: Weak<Inner>,
}

impl RuntimeRef {
    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    /// The runtime, or `Disposed` for `node` if it was dropped.
    pub(crate) fn get(&self, node: NodeId) -> Result<Runtime> {
        self.runtime().ok_or(ReactiveError::Disposed { node })
    }

    pub(crate) fn ptr_eq(&self, other: &RuntimeRef) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn read<T: Clone + 'static>(&self, id: NodeId, tracked: bool) -> Result<T> {
        self.get(id)?.read(id, tracked)
    }

    pub(crate) fn write(&self, id: NodeId, value: Box<dyn Any>) -> Result<()> {
        self.get(id)?.write(id, value)
    }

    pub(crate) fn dispose(&self, id: NodeId) -> Result<()> {
        self.get(id)?.dispose(id, true)
    }

    /// Run `f` with `owner` adopting its nodes. With the runtime gone there
    /// is nothing to adopt, so `f` just runs.
    pub(crate) fn with_owner<R>(&self, owner: Option<NodeId>, f: impl FnOnce() -> R) -> R {
        match self.runtime() {
            Some(rt) => rt.with_owner(owner, f),
            None => f(),
        }
    }

    /// Attach `cleanup` to `owner`. Dropped unrun if the owner or the
    /// runtime is gone.
    pub(crate) fn on_dispose_of<F>(&self, owner: NodeId, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        if let Some(rt) = self.runtime() {
            rt.with_owner(Some(owner), || rt.on_dispose(cleanup));
        }
    }

    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        self.runtime().is_some_and(|rt| rt.is_alive(id))
    }

    pub(crate) fn state_of(&self, id: NodeId) -> Result<DirtyState> {
        self.get(id)?.state_of(id)
    }

    pub(crate) fn run_count(&self, id: NodeId) -> Result<u64> {
        self.get(id)?.run_count(id)
    }

    pub(crate) fn node_name(&self, id: NodeId) -> Option<String> {
        self.runtime().and_then(|rt| rt.node_name(id))
    }
}

/// Marks a flush pass as running until dropped.
struct FlushGuard<'a> {
    scheduler: &'a RefCell<EffectScheduler>,
}

impl<'a> FlushGuard<'a> {
    fn enter(scheduler: &'a RefCell<EffectScheduler>) -> Self {
        debug!("flush pass started");
        scheduler.borrow_mut().set_flushing(true);
        Self { scheduler }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.borrow_mut().set_flushing(false);
    }
}

/// Keeps a batch open until dropped.
struct BatchGuard<'a> {
    scheduler: &'a RefCell<EffectScheduler>,
}

impl<'a> BatchGuard<'a> {
    fn enter(scheduler: &'a RefCell<EffectScheduler>) -> Self {
        scheduler.borrow_mut().open_batch();
        Self { scheduler }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.borrow_mut().close_batch();
    }
}
