//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo runs nothing. The computation runs on first access.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a direct dependency changes, the memo is marked dirty; when
//!    something further upstream changes it is marked maybe-dirty.
//!
//! 4. On next access, a maybe-dirty memo re-checks its sources first.
//!
//! 5. If a source actually changed, recompute. Otherwise, mark clean and
//!    return the cache.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! A memo with an equality check that recomputes to an equal value keeps
//! its previous value and does not invalidate its own observers.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use super::or_panic;
use super::runtime::{Runtime, RuntimeRef};
use super::signal::EqualsFn;
use crate::error::{BoxError, Result};
use crate::graph::{erase_equals, ComputeResult, DirtyState, Node, NodeId, NodeKind};

/// Options for [`Runtime::create_memo_with_options`].
pub struct MemoOptions<T> {
    /// Value handed to the first execution as its previous value, and
    /// returned by [`Memo::dispose`] if the memo never ran.
    pub initial: Option<T>,

    /// Recomputed values that compare equal to the previous one are
    /// discarded and do not notify observers.
    pub equals: Option<EqualsFn<T>>,

    /// Debug name.
    pub name: Option<String>,
}

impl<T> MemoOptions<T> {
    pub fn new() -> Self {
        Self {
            initial: None,
            equals: None,
            name: None,
        }
    }

    pub fn initial(mut self, value: T) -> Self {
        self.initial = Some(value);
        self
    }

    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equals = Some(std::rc::Rc::new(equals));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<T: PartialEq> MemoOptions<T> {
    /// Discard recomputed values equal under `PartialEq`.
    pub fn partial_eq() -> Self {
        Self::new().equals(|a: &T, b: &T| a == b)
    }
}

impl<T> Default for MemoOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use reflex_core::Runtime;
///
/// let rt = Runtime::new();
/// let width = rt.signal(3);
/// let height = rt.signal(4);
/// let area = rt.create_memo({
///     let (width, height) = (width.clone(), height.clone());
///     move || width.get() * height.get()
/// });
///
/// assert_eq!(area.get(), 12);
/// width.set(5);
/// assert_eq!(area.get(), 20);
/// ```
pub struct Memo<T> {
    id: NodeId,
    rt: RuntimeRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Memo<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the memo has been disposed, if it depends on itself, or if
    /// its computation failed.
    #[track_caller]
    pub fn get(&self) -> T {
        or_panic(self.try_get())
    }

    pub fn try_get(&self) -> Result<T> {
        self.rt.read(self.id, true)
    }

    #[track_caller]
    pub fn get_untracked(&self) -> T {
        or_panic(self.try_get_untracked())
    }

    pub fn try_get_untracked(&self) -> Result<T> {
        self.rt.read(self.id, false)
    }

    /// Dirty state, without settling the memo.
    pub fn state(&self) -> Result<DirtyState> {
        self.rt.state_of(self.id)
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> Result<u64> {
        self.rt.run_count(self.id)
    }

    pub fn is_disposed(&self) -> bool {
        !self.rt.is_alive(self.id)
    }

    /// Remove the memo and everything it owns.
    ///
    /// Returns the last computed value, or the initial value if the
    /// computation never ran.
    pub fn dispose(self) -> Result<Option<T>> {
        self.rt.get(self.id)?.dispose_with_value(self.id)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            rt: self.rt.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.rt.ptr_eq(&other.rt)
    }
}

impl<T> Eq for Memo<T> {}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("state", &self.rt.state_of(self.id).ok())
            .finish()
    }
}

impl Runtime {
    /// Create a memo that discards recomputed values equal to the previous
    /// one.
    pub fn create_memo<T, F>(&self, mut f: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut() -> T + 'static,
    {
        self.memo_node(MemoOptions::partial_eq(), move |_| Ok(f()))
    }

    /// Create a memo whose computation receives its previous value.
    pub fn create_memo_with_options<T, F>(&self, options: MemoOptions<T>, mut f: F) -> Memo<T>
    where
        T: Clone + 'static,
        F: FnMut(Option<&T>) -> T + 'static,
    {
        self.memo_node(options, move |prev| Ok(f(prev)))
    }

    /// Create a memo whose computation may fail.
    ///
    /// A failed execution keeps the previous value and leaves the memo
    /// stale, so the next read retries. The error is returned from
    /// [`Memo::try_get`] as `ReactiveError::Compute`.
    pub fn try_create_memo<T, F>(&self, mut f: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut() -> std::result::Result<T, BoxError> + 'static,
    {
        self.memo_node(MemoOptions::partial_eq(), move |_| f())
    }

    /// Fallible counterpart of [`Runtime::create_memo_with_options`].
    pub fn try_create_memo_with_options<T, F>(&self, options: MemoOptions<T>, f: F) -> Memo<T>
    where
        T: Clone + 'static,
        F: FnMut(Option<&T>) -> std::result::Result<T, BoxError> + 'static,
    {
        self.memo_node(options, f)
    }

    fn memo_node<T, F>(&self, options: MemoOptions<T>, mut f: F) -> Memo<T>
    where
        T: Clone + 'static,
        F: FnMut(Option<&T>) -> std::result::Result<T, BoxError> + 'static,
    {
        let compute = move |prev: Option<&dyn Any>| -> ComputeResult {
            let prev = prev.and_then(|prev| prev.downcast_ref::<T>());
            let next = f(prev)?;
            Ok(Some(Box::new(next) as Box<dyn Any>))
        };
        let node = Node::new(NodeKind::Memo)
            .with_value(options.initial.map(|value| Box::new(value) as Box<dyn Any>))
            .with_compute(Box::new(compute))
            .with_equals(options.equals.map(erase_equals))
            .with_name(options.name);
        Memo {
            id: self.create_node(node),
            rt: self.downgrade(),
            _marker: PhantomData,
        }
    }
}
