//! Reflex Core
//!
//! This crate provides a fine-grained, push-pull reactive computation
//! engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Lazy, glitch-free propagation over a dependency graph
//! - Ownership-based disposal of nested computations
//! - Keyed incremental mapping of reactive sequences
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node storage, dependency edges, staleness walks and the
//!   pending-effect scheduler
//! - `reactive`: The runtime engine and the handles built on it
//! - `config`: Runtime configuration
//! - `error`: Error kinds shared by every operation
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use reflex_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let doubled = rt.create_memo({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! rt.create_effect({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push(format!("{} {}", count.get(), doubled.get()))
//! });
//!
//! // Update the signal; the effect runs before `set` returns
//! count.set(5);
//! assert_eq!(*log.borrow(), vec!["0 0", "5 10"]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{BoxError, EffectFailure, ReactiveError, Result};
pub use graph::{DirtyState, NodeId, NodeKind};
pub use reactive::{
    Effect, EffectOptions, MappedArray, Memo, MemoOptions, ReadSignal, Runtime, Scope, Signal,
    SignalOptions, WriteSignal,
};
