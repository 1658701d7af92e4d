//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Reflex's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are marked stale.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes and someone reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems.
//!
//! ## Scopes
//!
//! A Scope owns the nodes created inside it and disposes them together.
//!
//! # Implementation Notes
//!
//! Each [`Runtime`] owns a context stack recording the computation currently
//! executing. When a node is read, the runtime checks the top of that stack
//! and, if a computation is listening, records the dependency. There is no
//! global state: runtimes are fully independent.

mod context;
mod effect;
mod map_array;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use effect::{Effect, EffectOptions};
pub use map_array::MappedArray;
pub use memo::{Memo, MemoOptions};
pub use runtime::Runtime;
pub use scope::Scope;
pub use signal::{EqualsFn, ReadSignal, Signal, SignalOptions, WriteSignal};

use crate::error::Result;

/// Unwrap for the panicking accessors, reporting the caller's location.
#[track_caller]
pub(crate) fn or_panic<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}
