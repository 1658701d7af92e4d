//! Integration Tests for Keyed Array Mapping
//!
//! These tests check that mapped entries are reused by key across reorders,
//! inserts and removals.

use std::collections::HashMap;
use std::rc::Rc;

use reflex_core::{MappedArray, ReadSignal, Runtime, Signal};

#[derive(Debug, PartialEq, Eq, Hash)]
struct Item {
    id: &'static str,
}

/// Mapped output: the item plus a live view of its position.
struct Row {
    item: Rc<Item>,
    index: ReadSignal<usize>,
}

fn items(ids: &[&'static str]) -> Vec<Rc<Item>> {
    ids.iter().map(|&id| Rc::new(Item { id })).collect()
}

fn rows(rt: &Runtime, source: &Signal<Vec<Rc<Item>>>) -> MappedArray<Rc<Row>> {
    rt.map_array(
        {
            let source = source.clone();
            move || source.get()
        },
        |item, index| {
            Rc::new(Row {
                item: item.get_untracked(),
                index,
            })
        },
    )
}

fn snapshot(rows: &[Rc<Row>]) -> Vec<(&'static str, usize)> {
    rows.iter()
        .map(|row| (row.item.id, row.index.get_untracked()))
        .collect()
}

/// Reorders, appends and removals reuse every surviving row.
#[test]
fn keyed_reuse_scenario() {
    let rt = Runtime::new();
    let abc = items(&["a", "b", "c"]);
    let (a, b, c) = (abc[0].clone(), abc[1].clone(), abc[2].clone());
    let source = rt.signal(abc);
    let mapped = rows(&rt, &source);

    let first = mapped.get();
    assert_eq!(snapshot(&first), vec![("a", 0), ("b", 1), ("c", 2)]);
    assert_eq!(mapped.map_fn_calls(), 3);

    // Swap positions 0 and 1
    source.set(vec![b.clone(), a.clone(), c.clone()]);
    let swapped = mapped.get();
    assert_eq!(snapshot(&swapped), vec![("b", 0), ("a", 1), ("c", 2)]);
    assert!(Rc::ptr_eq(&swapped[0], &first[1]));
    assert!(Rc::ptr_eq(&swapped[1], &first[0]));
    assert!(Rc::ptr_eq(&swapped[2], &first[2]));
    assert_eq!(mapped.map_fn_calls(), 3);

    // Append one item
    let d = Rc::new(Item { id: "d" });
    source.set(vec![b.clone(), a.clone(), c.clone(), d.clone()]);
    let appended = mapped.get();
    assert_eq!(appended.len(), 4);
    assert_eq!(snapshot(&appended)[3], ("d", 3));
    for (before, after) in swapped.iter().zip(&appended) {
        assert!(Rc::ptr_eq(before, after));
    }
    assert_eq!(mapped.map_fn_calls(), 4);

    // Back to source order, then slice off the first element
    let ordered = vec![a, b, c, d];
    source.set(ordered.clone());
    let restored = mapped.get();
    source.set(ordered[1..].to_vec());
    let sliced = mapped.get();

    assert_eq!(snapshot(&sliced), vec![("b", 0), ("c", 1), ("d", 2)]);
    assert!(Rc::ptr_eq(&sliced[0], &restored[1]));
    assert!(Rc::ptr_eq(&sliced[1], &restored[2]));
    assert!(Rc::ptr_eq(&sliced[2], &restored[3]));
    assert_eq!(mapped.map_fn_calls(), 4);
    assert_eq!(mapped.len_untracked(), 3);

    // The removed row's index signal went with its entry
    assert!(restored[0].index.is_disposed());
}

/// Value keys merge equal items; pointer keys keep each allocation apart.
#[test]
fn pointer_keys_separate_equal_items() {
    let rt = Runtime::new();
    let first = Rc::new(Item { id: "x" });
    let twin = Rc::new(Item { id: "x" });
    let source = rt.signal(vec![first.clone()]);

    let by_value = rows(&rt, &source);
    let by_pointer = rt.map_array_keyed(
        {
            let source = source.clone();
            move || source.get()
        },
        |item| Rc::as_ptr(item),
        |item, _| item.get_untracked(),
    );
    by_value.get();
    by_pointer.get();

    source.set(vec![first.clone(), twin.clone()]);
    assert_eq!(by_pointer.map_fn_calls(), 2);
    assert_eq!(by_pointer.len_untracked(), 2);
    let mapped = by_pointer.get();
    assert!(Rc::ptr_eq(&mapped[0], &first));
    assert!(Rc::ptr_eq(&mapped[1], &twin));

    // Both items share one value key; the later one keeps the slot
    assert_eq!(by_value.get().len(), 2);
    assert_eq!(by_value.len_untracked(), 1);

    // Swapping in the twin alone keeps the pointer entry for it
    source.set(vec![twin.clone()]);
    assert!(Rc::ptr_eq(&by_pointer.get()[0], &twin));
    assert_eq!(by_pointer.map_fn_calls(), 2);
}

/// An empty source disposes every entry.
#[test]
fn empty_source_clears_all_entries() {
    let rt = Runtime::new();
    let source = rt.signal(items(&["a", "b"]));
    let mapped = rows(&rt, &source);
    let before = mapped.get();
    let nodes_with_entries = rt.node_count();

    source.set(Vec::new());
    assert!(mapped.get().is_empty());
    assert_eq!(mapped.len_untracked(), 0);
    // Each entry holds a scope, two signals and a child memo
    assert_eq!(rt.node_count(), nodes_with_entries - 8);
    assert!(before.iter().all(|row| row.index.is_disposed()));
}

/// Mapped arrays compose with effects and re-run only on real changes.
#[test]
fn effect_over_mapped_array() {
    let rt = Runtime::new();
    let source = rt.signal(vec![1u32, 2, 3]);
    let mapped = rt.map_array(
        {
            let source = source.clone();
            move || source.get()
        },
        |item, _| item.get() * item.get(),
    );

    let sums = Rc::new(std::cell::RefCell::new(Vec::new()));
    let _effect = rt.create_effect({
        let (mapped, sums) = (mapped.clone(), sums.clone());
        move || sums.borrow_mut().push(mapped.get().iter().sum::<u32>())
    });

    source.set(vec![3, 2, 1]);
    source.set(vec![3, 2, 1, 4]);
    assert_eq!(*sums.borrow(), vec![14, 14, 30]);
    assert_eq!(mapped.map_fn_calls(), 4);
}

/// Mappers created inside a scope are torn down with it.
#[test]
fn mapper_follows_its_owner() {
    let rt = Runtime::new();
    let source = rt.signal(vec![1, 2, 3]);
    let scope = rt.create_scope();
    let mapped = scope.run(|| {
        let source = source.clone();
        rt.map_array(move || source.get(), |item, _| item.get())
    });
    assert_eq!(mapped.get(), vec![1, 2, 3]);

    scope.dispose().unwrap();
    assert!(mapped.is_disposed());
    assert_eq!(rt.node_count(), 1);
}

mod reconciliation {
    use super::*;
    use proptest::prelude::*;

    fn universe() -> Vec<u8> {
        (0..12).collect()
    }

    fn sequence() -> impl Strategy<Value = Vec<u8>> {
        prop::sample::subsequence(universe(), 0..=12).prop_shuffle()
    }

    proptest! {
        /// Every step yields the mapped source, creates one child per new key
        /// and reuses the output of every key that survived.
        #[test]
        fn mapper_matches_source(steps in prop::collection::vec(sequence(), 1..8)) {
            let rt = Runtime::new();
            let source = rt.signal(Vec::<u8>::new());
            let mapped = rt.map_array(
                {
                    let source = source.clone();
                    move || source.get()
                },
                |key, _| Rc::new(key.get_untracked()),
            );
            prop_assert!(mapped.get().is_empty());

            let mut previous: HashMap<u8, Rc<u8>> = HashMap::new();
            let mut expected_calls = 0u64;

            for step in steps {
                source.set(step.clone());
                let output = mapped.get();

                let values: Vec<u8> = output.iter().map(|value| **value).collect();
                prop_assert_eq!(&values, &step);
                prop_assert_eq!(mapped.len_untracked(), step.len());

                let mut current = HashMap::new();
                for (key, value) in step.iter().zip(&output) {
                    match previous.get(key) {
                        Some(old) => {
                            prop_assert!(Rc::ptr_eq(old, value), "key {} was remapped", key);
                        }
                        None => expected_calls += 1,
                    }
                    current.insert(*key, value.clone());
                }
                prop_assert_eq!(mapped.map_fn_calls(), expected_calls);
                previous = current;
            }
        }
    }
}
