//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    runtime records that computation as an observer.
//!
//! 2. When a signal's value changes, every observer is marked stale and the
//!    affected effects are scheduled.
//!
//! 3. A write of an equal value (per the signal's equality check) is a no-op.
//!
//! # Handles
//!
//! The value lives in the runtime's graph; a handle is a node id plus the
//! runtime. [`Signal`] can read and write, [`ReadSignal`] and [`WriteSignal`]
//! are its split halves. Handles are cheap to clone and all clones refer to
//! the same node.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::or_panic;
use super::runtime::{Runtime, RuntimeRef};
use crate::error::Result;
use crate::graph::{erase_equals, Node, NodeId, NodeKind};

/// Equality check deciding whether a new value counts as a change.
pub type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Options for [`Runtime::signal_with_options`].
pub struct SignalOptions<T> {
    /// Writes that compare equal to the current value are skipped.
    /// Without a check every write notifies.
    pub equals: Option<EqualsFn<T>>,

    /// Debug name.
    pub name: Option<String>,
}

impl<T> SignalOptions<T> {
    pub fn new() -> Self {
        Self {
            equals: None,
            name: None,
        }
    }

    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equals = Some(Rc::new(equals));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<T: PartialEq> SignalOptions<T> {
    /// Skip writes of values equal under `PartialEq`.
    pub fn partial_eq() -> Self {
        Self::new().equals(|a: &T, b: &T| a == b)
    }
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A reactive signal holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use reflex_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    id: NodeId,
    rt: RuntimeRef,
    _marker: PhantomData<fn() -> T>,
}

/// Read half of a signal.
pub struct ReadSignal<T> {
    id: NodeId,
    rt: RuntimeRef,
    _marker: PhantomData<fn() -> T>,
}

/// Write half of a signal.
pub struct WriteSignal<T> {
    id: NodeId,
    rt: RuntimeRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Signal<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// Inside a memo or effect this also records the signal as a source.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    #[track_caller]
    pub fn get(&self) -> T {
        or_panic(self.try_get())
    }

    pub fn try_get(&self) -> Result<T> {
        self.rt.read(self.id, true)
    }

    /// Get the current value without recording a dependency.
    #[track_caller]
    pub fn get_untracked(&self) -> T {
        or_panic(self.try_get_untracked())
    }

    pub fn try_get_untracked(&self) -> Result<T> {
        self.rt.read(self.id, false)
    }

    /// Set a new value and notify observers.
    ///
    /// At top level this also runs every effect the write scheduled.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed, if the write would
    /// invalidate a computation that is still running, or if an effect
    /// failed during the flush it triggered.
    #[track_caller]
    pub fn set(&self, value: T) {
        or_panic(self.try_set(value))
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        self.rt.write(self.id, Box::new(value))
    }

    /// Set the value computed from the current one.
    #[track_caller]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        or_panic(self.try_update(f))
    }

    pub fn try_update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.try_get_untracked()?;
        self.try_set(f(&current))
    }

    /// Split into read and write halves for the same node.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        let read = self.read_only();
        let write = WriteSignal {
            id: self.id,
            rt: self.rt,
            _marker: PhantomData,
        };
        (read, write)
    }

    /// A read-only handle to the same node.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            id: self.id,
            rt: self.rt.clone(),
            _marker: PhantomData,
        }
    }

    pub fn is_disposed(&self) -> bool {
        !self.rt.is_alive(self.id)
    }

    /// Remove the signal from the graph. Later reads and writes fail with
    /// `ReactiveError::Disposed`.
    pub fn dispose(self) -> Result<()> {
        self.rt.dispose(self.id)
    }
}

impl<T: Clone + 'static> ReadSignal<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

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

    pub fn is_disposed(&self) -> bool {
        !self.rt.is_alive(self.id)
    }
}

impl<T: Clone + 'static> WriteSignal<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[track_caller]
    pub fn set(&self, value: T) {
        or_panic(self.try_set(value))
    }

    pub fn try_set(&self, value: T) -> Result<()> {
        self.rt.write(self.id, Box::new(value))
    }

    #[track_caller]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        or_panic(self.try_update(f))
    }

    pub fn try_update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.rt.read::<T>(self.id, false)?;
        self.try_set(f(&current))
    }

    pub fn is_disposed(&self) -> bool {
        !self.rt.is_alive(self.id)
    }
}

macro_rules! impl_handle_traits {
    ($($handle:ident),*) => {
        $(
            impl<T> Clone for $handle<T> {
                fn clone(&self) -> Self {
                    Self {
                        id: self.id,
                        rt: self.rt.clone(),
                        _marker: PhantomData,
                    }
                }
            }

            impl<T> PartialEq for $handle<T> {
                fn eq(&self, other: &Self) -> bool {
                    self.id == other.id && self.rt.ptr_eq(&other.rt)
                }
            }

            impl<T> Eq for $handle<T> {}

            impl<T> fmt::Debug for $handle<T> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($handle))
                        .field("id", &self.id)
                        .field("alive", &self.rt.is_alive(self.id))
                        .finish()
                }
            }
        )*
    };
}

impl_handle_traits!(Signal, ReadSignal, WriteSignal);

impl Runtime {
    /// Create a signal that skips writes of equal values.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.signal_with_options(value, SignalOptions::partial_eq())
    }

    /// Create a signal with an explicit equality check and debug name.
    pub fn signal_with_options<T>(&self, value: T, options: SignalOptions<T>) -> Signal<T>
    where
        T: Clone + 'static,
    {
        let node = Node::new(NodeKind::Signal)
            .with_value(Some(Box::new(value)))
            .with_equals(options.equals.map(erase_equals))
            .with_name(options.name);
        Signal {
            id: self.create_node(node),
            rt: self.downgrade(),
            _marker: PhantomData,
        }
    }

    /// Create a signal and return its read and write halves.
    pub fn create_signal<T>(&self, value: T) -> (ReadSignal<T>, WriteSignal<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        self.signal(value).split()
    }
}
