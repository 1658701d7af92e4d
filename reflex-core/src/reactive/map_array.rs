//! Keyed Array Mapping
//!
//! [`Runtime::map_array`] turns a reactive sequence into a reactive sequence
//! of mapped items, keeping one child computation per key alive for as long
//! as the key stays in the source.
//!
//! # Reconciliation
//!
//! The mapper is a memo whose only tracked source is the source closure.
//! Whenever the source changes it walks the new sequence once:
//!
//! 1. A key seen for the first time gets an entry: an item signal, an index
//!    signal and a child memo calling the mapping function with both as
//!    read-only signals. The child runs immediately.
//! 2. A key already in the table keeps its entry. Its item signal is written
//!    only if the item changed, and its index signal only if it moved, so
//!    children re-run only when what they read changed.
//! 3. Keys that disappeared have their entry disposed, which runs the
//!    cleanups registered by the child.
//!
//! The output is then collected by reading every child in source order.
//!
//! # Ownership
//!
//! Entries are owned by a scope created with the mapper, not by the mapper
//! memo, so re-running the memo does not tear them down. Disposing the
//! [`MappedArray`] (or whatever owned it) disposes the scope and every entry.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::memo::{Memo, MemoOptions};
use super::or_panic;
use super::runtime::{Runtime, RuntimeRef};
use super::scope::Scope;
use super::signal::{ReadSignal, Signal};
use crate::error::{BoxError, Result};
use crate::graph::NodeId;

/// Per-key state of a mapper.
struct Entry<T, R> {
    scope: Scope,
    item: Signal<T>,
    index: Signal<usize>,
    child: Memo<R>,
}

impl<T, R> Entry<T, R>
where
    T: Clone + PartialEq + 'static,
    R: Clone + 'static,
{
    /// Bring the entry to `item` at `index`. Returns whether it moved.
    fn update(&self, item: T, index: usize) -> Result<bool> {
        self.item.try_set(item)?;
        let moved = self.index.try_get_untracked()? != index;
        if moved {
            self.index.try_set(index)?;
        }
        Ok(moved)
    }

    fn dispose(&self) {
        if let Err(err) = self.scope.dispose() {
            trace!(scope = %self.scope.id(), error = %err, "entry scope already gone");
        }
    }
}

type KeyFn<T, K> = Rc<dyn Fn(&T) -> K>;
type MapFn<T, R> = Rc<dyn Fn(ReadSignal<T>, ReadSignal<usize>) -> R>;

/// Reconciliation state shared with the mapper memo.
struct Mapper<T, K, R> {
    rt: RuntimeRef,
    scope: Scope,
    key_fn: KeyFn<T, K>,
    map_fn: MapFn<T, R>,
    table: RefCell<IndexMap<K, Entry<T, R>>>,
    stats: Rc<MapperStats>,
}

#[derive(Default)]
struct MapperStats {
    map_fn_calls: Cell<u64>,
    entries: Cell<usize>,
}

impl<T, K, R> Mapper<T, K, R>
where
    T: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + 'static,
    R: Clone + 'static,
{
    fn reconcile(&self, items: Vec<T>) -> Result<Vec<R>> {
        let rt = self.rt.get(self.scope.id())?;
        let mut old = std::mem::take(&mut *self.table.borrow_mut());
        let mut next = IndexMap::with_capacity(items.len());
        let mut keys = Vec::with_capacity(items.len());

        let outcome = self.place_items(&rt, items, &mut old, &mut next, &mut keys);
        let (created, moved) = match outcome {
            Ok(counts) => counts,
            Err(err) => {
                // Keep every entry reachable so the next run can reuse it
                next.extend(old);
                self.stats.entries.set(next.len());
                *self.table.borrow_mut() = next;
                return Err(err);
            }
        };

        let removed = old.len();
        for (_, entry) in old {
            entry.dispose();
        }

        let children: Vec<Memo<R>> = keys
            .iter()
            .filter_map(|key| next.get(key).map(|entry| entry.child.clone()))
            .collect();
        self.stats.entries.set(next.len());
        *self.table.borrow_mut() = next;

        debug!(
            mapper = %self.scope.id(),
            len = children.len(),
            created,
            moved,
            removed,
            "reconciled mapped array"
        );
        children.iter().map(Memo::try_get).collect()
    }

    /// Move or create the entry of every item, in source order.
    fn place_items(
        &self,
        rt: &Runtime,
        items: Vec<T>,
        old: &mut IndexMap<K, Entry<T, R>>,
        next: &mut IndexMap<K, Entry<T, R>>,
        keys: &mut Vec<K>,
    ) -> Result<(usize, usize)> {
        let mut created = 0;
        let mut moved = 0;

        for (index, item) in items.into_iter().enumerate() {
            let key = (self.key_fn)(&item);
            let entry = match old.swap_remove(&key) {
                Some(entry) => {
                    match entry.update(item, index) {
                        Ok(true) => moved += 1,
                        Ok(false) => {}
                        Err(err) => {
                            next.insert(key, entry);
                            return Err(err);
                        }
                    }
                    entry
                }
                None => {
                    created += 1;
                    self.create_entry(rt, item, index)?
                }
            };

            if let Some(replaced) = next.insert(key.clone(), entry) {
                warn!(
                    mapper = %self.scope.id(),
                    index,
                    "duplicate key in mapped array source, earlier entry disposed"
                );
                replaced.dispose();
            }
            keys.push(key);
        }

        Ok((created, moved))
    }

    fn create_entry(&self, rt: &Runtime, item: T, index: usize) -> Result<Entry<T, R>> {
        let scope = self.scope.run(|| rt.create_scope());
        let (item, index, child) = scope.run(|| {
            let item = rt.signal(item);
            let index = rt.signal(index);
            let child = rt.create_memo_with_options(MemoOptions::new(), {
                let (item, index) = (item.read_only(), index.read_only());
                let map_fn = self.map_fn.clone();
                let stats = self.stats.clone();
                move |_| {
                    stats.map_fn_calls.set(stats.map_fn_calls.get() + 1);
                    map_fn(item.clone(), index.clone())
                }
            });
            (item, index, child)
        });

        // Children run eagerly
        if let Err(err) = child.try_get_untracked() {
            if let Err(dispose_err) = scope.dispose() {
                trace!(error = %dispose_err, "entry scope already gone");
            }
            return Err(err);
        }
        Ok(Entry {
            scope,
            item,
            index,
            child,
        })
    }
}

/// Reactive output of [`Runtime::map_array`].
///
/// Reading it returns the mapped items in source order, reconciling first
/// if the source changed.
pub struct MappedArray<R> {
    memo: Memo<Vec<R>>,
    scope: Scope,
    stats: Rc<MapperStats>,
}

impl<R: Clone + 'static> MappedArray<R> {
    pub fn id(&self) -> NodeId {
        self.memo.id()
    }

    /// Current mapped items, tracked.
    ///
    /// # Panics
    ///
    /// Panics if the mapper has been disposed or the source failed.
    #[track_caller]
    pub fn get(&self) -> Vec<R> {
        or_panic(self.try_get())
    }

    pub fn try_get(&self) -> Result<Vec<R>> {
        self.memo.try_get()
    }

    #[track_caller]
    pub fn get_untracked(&self) -> Vec<R> {
        or_panic(self.try_get_untracked())
    }

    pub fn try_get_untracked(&self) -> Result<Vec<R>> {
        self.memo.try_get_untracked()
    }

    /// The underlying memo.
    pub fn memo(&self) -> &Memo<Vec<R>> {
        &self.memo
    }

    /// Number of live entries, as of the last reconciliation.
    pub fn len_untracked(&self) -> usize {
        self.stats.entries.get()
    }

    /// Total calls of the mapping function so far.
    pub fn map_fn_calls(&self) -> u64 {
        self.stats.map_fn_calls.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_disposed()
    }

    /// Dispose the mapper and every entry, running their cleanups.
    pub fn dispose(&self) -> Result<()> {
        self.scope.dispose()?;
        self.stats.entries.set(0);
        Ok(())
    }
}

impl<R> Clone for MappedArray<R> {
    fn clone(&self) -> Self {
        Self {
            memo: self.memo.clone(),
            scope: self.scope.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<R> fmt::Debug for MappedArray<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedArray")
            .field("memo", &self.memo)
            .field("entries", &self.stats.entries.get())
            .field("map_fn_calls", &self.stats.map_fn_calls.get())
            .finish()
    }
}

impl Runtime {
    /// Map a reactive sequence whose items are their own keys.
    ///
    /// # Identity
    ///
    /// Items are matched by value: two items that compare equal share one
    /// entry, and an entry's item signal is only written when the new item
    /// differs. For `Rc` items with equal contents this means a replacement
    /// allocation is not seen by `item.get()`. To match by allocation
    /// instead, key on the pointer:
    ///
    /// ```rust
    /// use std::rc::Rc;
    /// use reflex_core::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let items = rt.signal(vec![Rc::new(1), Rc::new(1)]);
    /// let mapped = rt.map_array_keyed(
    ///     {
    ///         let items = items.clone();
    ///         move || items.get()
    ///     },
    ///     |item| Rc::as_ptr(item),
    ///     |item, _| *item.get_untracked(),
    /// );
    ///
    /// assert_eq!(mapped.get(), vec![1, 1]);
    /// assert_eq!(mapped.map_fn_calls(), 2);
    /// ```
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::rc::Rc;
    /// use reflex_core::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let names = rt.signal(vec!["a", "b"]);
    /// let rows = rt.map_array(
    ///     {
    ///         let names = names.clone();
    ///         move || names.get()
    ///     },
    ///     |name, index| Rc::new(format!("{}:{}", name.get_untracked(), index.get_untracked())),
    /// );
    ///
    /// let before = rows.get();
    /// names.set(vec!["b", "a"]);
    /// let after = rows.get();
    ///
    /// assert!(Rc::ptr_eq(&before[0], &after[1]));
    /// assert_eq!(rows.map_fn_calls(), 2);
    /// ```
    pub fn map_array<T, R, S, M>(&self, source: S, map_fn: M) -> MappedArray<R>
    where
        T: Clone + Eq + Hash + 'static,
        R: Clone + 'static,
        S: Fn() -> Vec<T> + 'static,
        M: Fn(ReadSignal<T>, ReadSignal<usize>) -> R + 'static,
    {
        self.map_array_keyed(source, T::clone, map_fn)
    }

    /// Map a reactive sequence, identifying items by `key_fn`.
    ///
    /// `map_fn` runs once per key for as long as the key stays in the
    /// source, plus once more each time it re-runs because the item or
    /// index signal it read changed.
    pub fn map_array_keyed<T, K, R, S, KF, M>(
        &self,
        source: S,
        key_fn: KF,
        map_fn: M,
    ) -> MappedArray<R>
    where
        T: Clone + PartialEq + 'static,
        K: Clone + Eq + Hash + 'static,
        R: Clone + 'static,
        S: Fn() -> Vec<T> + 'static,
        KF: Fn(&T) -> K + 'static,
        M: Fn(ReadSignal<T>, ReadSignal<usize>) -> R + 'static,
    {
        let scope = self.create_scope();
        let stats = Rc::new(MapperStats::default());
        let mapper = Mapper {
            rt: self.downgrade(),
            scope: scope.clone(),
            key_fn: Rc::new(key_fn),
            map_fn: Rc::new(map_fn),
            table: RefCell::new(IndexMap::new()),
            stats: stats.clone(),
        };

        let memo = scope.run(|| {
            self.try_create_memo_with_options(
                MemoOptions::new().name("map_array"),
                move |_| -> std::result::Result<Vec<R>, BoxError> {
                    let items = source();
                    Ok(mapper.reconcile(items)?)
                },
            )
        });

        MappedArray { memo, scope, stats }
    }
}
