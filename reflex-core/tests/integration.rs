//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, and effects work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reflex_core::{
    EffectOptions, MemoOptions, ReactiveError, Runtime, RuntimeConfig, Signal,
};

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn bump(count: &Cell<u32>) {
    count.set(count.get() + 1);
}

/// Test that a memo tracks signal dependencies.
#[test]
fn memo_tracks_signal_dependency() {
    let rt = Runtime::new();
    let signal = rt.signal(10);

    let memo = rt.create_memo({
        let signal = signal.clone();
        move || signal.get() * 2
    });

    // First access computes the value
    assert_eq!(memo.get(), 20);

    // No manual invalidation needed
    signal.set(5);
    assert_eq!(memo.get(), 10);
}

/// Test that an effect re-runs by itself when its dependency changes.
#[test]
fn effect_tracks_signal_dependency() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let observed = Rc::new(Cell::new(-1));

    let _effect = rt.create_effect({
        let (signal, observed) = (signal.clone(), observed.clone());
        move || observed.set(signal.get())
    });

    // Effect runs on creation, captures initial value
    assert_eq!(observed.get(), 0);

    signal.set(42);
    assert_eq!(observed.get(), 42);
}

/// Test that a memo never read never runs, however often its inputs change.
#[test]
fn unread_memo_never_computes() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let (runs, runs_in) = counter();

    let memo = rt.create_memo({
        let signal = signal.clone();
        move || {
            bump(&runs_in);
            signal.get()
        }
    });

    for value in 1..=10 {
        signal.set(value);
    }
    assert_eq!(runs.get(), 0);

    assert_eq!(memo.get(), 10);
    assert_eq!(runs.get(), 1);
}

/// Test that memos can depend on other memos.
#[test]
fn memo_chain() {
    let rt = Runtime::new();
    let base = rt.signal(2);
    let doubled = rt.create_memo({
        let base = base.clone();
        move || base.get() * 2
    });
    let quadrupled = rt.create_memo({
        let doubled = doubled.clone();
        move || doubled.get() * 2
    });

    assert_eq!(quadrupled.get(), 8);
    base.set(3);
    assert_eq!(quadrupled.get(), 12);
}

/// A single write into a diamond recomputes the join exactly once and never
/// shows it a half-updated pair.
#[test]
fn diamond_is_glitch_free() {
    let rt = Runtime::new();
    let a = rt.signal(1);
    let b = rt.create_memo({
        let a = a.clone();
        move || a.get() + 1
    });
    let c = rt.create_memo({
        let a = a.clone();
        move || a.get() * 10
    });
    let (d_runs, d_runs_in) = counter();
    let d = rt.create_memo({
        let (b, c) = (b.clone(), c.clone());
        move || {
            bump(&d_runs_in);
            (b.get(), c.get())
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let _effect = rt.create_effect({
        let (d, seen) = (d.clone(), seen.clone());
        move || seen.borrow_mut().push(d.get())
    });
    assert_eq!(d_runs.get(), 1);

    a.set(2);
    assert_eq!(d_runs.get(), 2);
    assert_eq!(*seen.borrow(), vec![(2, 10), (3, 20)]);
}

/// Effects run in the order their staleness was discovered, breadth-first
/// from the write.
#[test]
fn effects_run_in_discovery_order() {
    let rt = Runtime::new();
    let source = rt.signal(0);
    let derived = rt.create_memo({
        let source = source.clone();
        move || source.get() + 1
    });
    let log = Rc::new(RefCell::new(Vec::new()));

    // Reads the source through a memo, one level further away
    let _far = rt.create_effect({
        let (derived, log) = (derived.clone(), log.clone());
        move || log.borrow_mut().push(format!("far {}", derived.get()))
    });
    let _near = rt.create_effect({
        let (source, log) = (source.clone(), log.clone());
        move || log.borrow_mut().push(format!("near {}", source.get()))
    });
    log.borrow_mut().clear();

    source.set(1);
    assert_eq!(*log.borrow(), vec!["near 1", "far 2"]);
}

/// Writes made by an effect extend the running flush pass.
#[test]
fn effect_writes_extend_the_same_pass() {
    let rt = Runtime::new();
    let input = rt.signal(1);
    let relay = rt.signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let _forward = rt.create_effect({
        let (input, relay) = (input.clone(), relay.clone());
        move || relay.set(input.get() * 100)
    });
    let _sink = rt.create_effect({
        let (relay, log) = (relay.clone(), log.clone());
        move || log.borrow_mut().push(relay.get())
    });
    assert_eq!(*log.borrow(), vec![100]);

    input.set(2);
    // Both effects ran before `set` returned
    assert_eq!(*log.borrow(), vec![100, 200]);
}

/// A failing effect does not stop the rest of the pass; every failure is
/// returned and reported to the hook.
#[test]
fn effect_failures_are_collected() {
    let reported = Rc::new(RefCell::new(Vec::new()));
    let config = RuntimeConfig::default().on_effect_error({
        let reported = reported.clone();
        move |failure| reported.borrow_mut().push(failure.name.clone())
    });
    let rt = Runtime::with_config(config);
    let signal = rt.signal(0);
    let (healthy_runs, healthy_in) = counter();

    let _picky = rt
        .try_create_effect_with_options(EffectOptions::new().name("picky"), {
            let signal = signal.clone();
            move || {
                if signal.try_get()? % 2 == 1 {
                    return Err("odd values are not allowed".into());
                }
                Ok(())
            }
        })
        .unwrap();
    let _healthy = rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump(&healthy_in);
        }
    });

    let err = signal.try_set(1).unwrap_err();
    match err {
        ReactiveError::EffectExecution { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name.as_deref(), Some("picky"));
            assert!(matches!(*failures[0].error, ReactiveError::Compute { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(healthy_runs.get(), 2);
    assert_eq!(*reported.borrow(), vec![Some("picky".to_string())]);

    // The failed effect retries on its next change
    signal.set(2);
    assert_eq!(healthy_runs.get(), 3);
}

/// A computation that writes one of its own sources is rejected instead of
/// looping.
#[test]
fn writing_a_tracked_source_is_a_cycle() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let outcome = Rc::new(RefCell::new(None));

    let _effect = rt.create_effect({
        let (signal, outcome) = (signal.clone(), outcome.clone());
        move || {
            let value = signal.get();
            *outcome.borrow_mut() = Some(signal.try_set(value + 1));
        }
    });

    let result = outcome.borrow_mut().take().unwrap();
    assert!(result.unwrap_err().is_cycle());
    assert_eq!(signal.get(), 0);
}

/// Two memos that read each other report a cycle instead of recursing.
#[test]
fn transitive_memo_cycle_is_detected() {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<reflex_core::Memo<i32>>>> = Rc::default();

    let a = rt.try_create_memo({
        let slot = slot.clone();
        move || {
            let b = slot.borrow().clone();
            match b {
                Some(b) => Ok(b.try_get()? + 1),
                None => Ok(0),
            }
        }
    });
    let b = rt.try_create_memo({
        let a = a.clone();
        move || Ok(a.try_get()? + 1)
    });
    *slot.borrow_mut() = Some(b.clone());

    assert!(a.try_get().unwrap_err().is_cycle());
    assert!(b.try_get().unwrap_err().is_cycle());

    // Breaking the loop lets both settle
    slot.borrow_mut().take();
    assert_eq!(a.try_get().unwrap(), 0);
    assert_eq!(b.try_get().unwrap(), 1);
}

/// Reading untracked and then writing is allowed.
#[test]
fn untracked_read_then_write_is_allowed() {
    let rt = Runtime::new();
    let trigger = rt.signal(0);
    let total = rt.signal(0);

    let _accumulate = rt.create_effect({
        let (trigger, total) = (trigger.clone(), total.clone());
        move || {
            let step = trigger.get();
            total.set(total.get_untracked() + step);
        }
    });

    trigger.set(5);
    trigger.set(7);
    assert_eq!(total.get(), 12);
}

/// A stopped effect never runs again, and writes to its former sources
/// neither re-run it nor fail.
#[test]
fn stopped_effect_is_isolated() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let (runs, runs_in) = counter();

    let effect = rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump(&runs_in);
        }
    });
    effect.stop().unwrap();

    signal.try_set(1).unwrap();
    assert_eq!(runs.get(), 1);
    assert!(rt.observers_of(signal.id()).unwrap().is_empty());
}

/// A cleanup that writes the stopping effect's own source does not bring the
/// effect back.
#[test]
fn cleanup_write_during_stop_does_not_rerun() {
    let rt = Runtime::new();
    let active = rt.signal(true);
    let (runs, runs_in) = counter();
    let (cleanups, cleanups_in) = counter();

    let effect = rt.create_effect({
        let (rt, active) = (rt.clone(), active.clone());
        move || {
            active.get();
            bump(&runs_in);
            let (active, cleanups_in) = (active.clone(), cleanups_in.clone());
            rt.on_dispose(move || {
                bump(&cleanups_in);
                active.try_set(false).unwrap();
            });
        }
    });
    assert_eq!(runs.get(), 1);

    effect.stop().unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(cleanups.get(), 1);
    assert!(!active.get());
    assert!(effect.is_stopped());
    assert_eq!(rt.node_count(), 1);
}

/// Stopping an effect from inside one of its cleanups is a no-op.
#[test]
fn stop_inside_own_cleanup_is_ignored() {
    let rt = Runtime::new();
    let slot: Rc<RefCell<Option<reflex_core::Effect>>> = Rc::default();
    let inner_stop = Rc::new(RefCell::new(None));

    let effect = rt.create_effect({
        let (rt, slot, inner_stop) = (rt.clone(), slot.clone(), inner_stop.clone());
        move || {
            let (slot, inner_stop) = (slot.clone(), inner_stop.clone());
            rt.on_dispose(move || {
                if let Some(me) = slot.borrow().as_ref() {
                    *inner_stop.borrow_mut() = Some(me.stop().is_ok());
                }
            });
        }
    });
    *slot.borrow_mut() = Some(effect.clone());

    effect.stop().unwrap();
    assert_eq!(*inner_stop.borrow(), Some(true));
    assert!(effect.is_stopped());
}

/// Stopping an effect during a flush cancels its pending run.
#[test]
fn stopping_a_pending_effect_skips_it() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let victim_slot: Rc<RefCell<Option<reflex_core::Effect>>> = Rc::default();
    let (victim_runs, victim_in) = counter();

    let _killer = rt.create_effect({
        let (signal, slot) = (signal.clone(), victim_slot.clone());
        move || {
            if signal.get() > 0 {
                if let Some(victim) = slot.borrow_mut().take() {
                    victim.stop().unwrap();
                }
            }
        }
    });
    let victim = rt.create_effect({
        let signal = signal.clone();
        move || {
            signal.get();
            bump(&victim_in);
        }
    });
    *victim_slot.borrow_mut() = Some(victim.clone());

    signal.set(1);
    assert!(victim.is_stopped());
    assert_eq!(victim_runs.get(), 1);
}

/// Nodes created by a computation are disposed before it re-runs.
#[test]
fn owned_computations_are_replaced_on_rerun() {
    let rt = Runtime::new();
    let outer_input = rt.signal(0);
    let inner_input = rt.signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let _outer = rt.create_effect({
        let (rt, outer_input, inner_input, log) =
            (rt.clone(), outer_input.clone(), inner_input.clone(), log.clone());
        move || {
            let generation = outer_input.get();
            let log = log.clone();
            let inner_input = inner_input.clone();
            rt.create_effect({
                let (rt, log) = (rt.clone(), log.clone());
                move || {
                    log.borrow_mut()
                        .push(format!("inner {generation} sees {}", inner_input.get()));
                    let log = log.clone();
                    rt.on_dispose(move || log.borrow_mut().push(format!("drop {generation}")));
                }
            });
        }
    });
    let nodes = rt.node_count();

    inner_input.set(1);
    outer_input.set(1);
    inner_input.set(2);

    assert_eq!(
        *log.borrow(),
        vec![
            "inner 0 sees 0",
            "drop 0",
            "inner 0 sees 1",
            "drop 0",
            "inner 1 sees 1",
            "drop 1",
            "inner 1 sees 2",
        ]
    );
    // The old inner effect was freed, not leaked
    assert_eq!(rt.node_count(), nodes);
}

/// Batches coalesce writes into one flush.
#[test]
fn batch_coalesces_writes() {
    let rt = Runtime::new();
    let first = rt.signal("Ada".to_string());
    let last = rt.signal("Lovelace".to_string());
    let names = Rc::new(RefCell::new(Vec::new()));

    let _effect = rt.create_effect({
        let (first, last, names) = (first.clone(), last.clone(), names.clone());
        move || names.borrow_mut().push(format!("{} {}", first.get(), last.get()))
    });

    rt.batch(|| {
        first.set("Grace".to_string());
        last.set("Hopper".to_string());
        assert!(rt.is_batching());
    })
    .unwrap();

    assert_eq!(*names.borrow(), vec!["Ada Lovelace", "Grace Hopper"]);
}

/// `flush_sync` runs pending effects even while a batch is open.
#[test]
fn flush_sync_forces_pending_effects() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let observed = Rc::new(Cell::new(0));
    let effect = rt.create_effect({
        let (signal, observed) = (signal.clone(), observed.clone());
        move || observed.set(signal.get())
    });

    rt.batch(|| {
        signal.set(3);
        assert!(rt.is_scheduled(effect.id()));
        assert_eq!(observed.get(), 0);

        rt.flush_sync().unwrap();
        assert_eq!(observed.get(), 3);
    })
    .unwrap();
}

/// Memo errors reach the reader and leave the memo retryable.
#[test]
fn memo_errors_propagate_to_effects() {
    let rt = Runtime::new();
    let divisor = rt.signal(2);
    let quotient = rt.try_create_memo({
        let divisor = divisor.clone();
        move || match divisor.get() {
            0 => Err("division by zero".into()),
            d => Ok(100 / d),
        }
    });
    let observed = Rc::new(Cell::new(0));
    let _effect = rt
        .try_create_effect({
            let (quotient, observed) = (quotient.clone(), observed.clone());
            move || {
                observed.set(quotient.try_get()?);
                Ok(())
            }
        })
        .unwrap();
    assert_eq!(observed.get(), 50);

    let err = divisor.try_set(0).unwrap_err();
    let ReactiveError::EffectExecution { failures } = err else {
        panic!("expected effect failures");
    };
    match &*failures[0].error {
        ReactiveError::Compute { node, .. } => assert_eq!(*node, quotient.id()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(observed.get(), 50);

    divisor.set(4);
    assert_eq!(observed.get(), 25);
}

/// Memo `initial` feeds the first run.
#[test]
fn memo_initial_value_seeds_first_run() {
    let rt = Runtime::new();
    let step = rt.signal(1);
    let running_total = rt.create_memo_with_options(MemoOptions::new().initial(100), {
        let step = step.clone();
        move |prev: Option<&i32>| prev.copied().unwrap_or_default() + step.get()
    });

    assert_eq!(running_total.get(), 101);
    step.set(2);
    assert_eq!(running_total.get(), 103);
}

/// Disposed handles are loud, and dropping the runtime disposes everything.
#[test]
fn disposed_access_is_an_error() {
    let rt = Runtime::new();
    let signal: Signal<u8> = rt.signal(1);
    let handle = signal.clone();

    signal.dispose().unwrap();
    assert!(handle.try_get().unwrap_err().is_disposed());
    assert!(handle.try_set(2).unwrap_err().is_disposed());
    assert!(handle.clone().dispose().unwrap_err().is_disposed());

    let survivor = rt.signal(5u8);
    drop(rt);
    assert!(survivor.is_disposed());
    assert!(matches!(
        survivor.try_get(),
        Err(ReactiveError::Disposed { node }) if node == survivor.id()
    ));
}

/// `on_dispose` at top level is a no-op.
#[test]
fn on_dispose_without_owner_is_ignored() {
    let rt = Runtime::new();
    let fired = Rc::new(Cell::new(false));
    rt.on_dispose({
        let fired = fired.clone();
        move || fired.set(true)
    });
    let scope = rt.create_scope();
    scope.dispose().unwrap();
    assert!(!fired.get());
}

/// Separate runtimes share nothing.
#[test]
fn runtimes_are_independent() {
    let left = Runtime::new();
    let right = Runtime::new();
    let a = left.signal(1);
    let b = right.signal(1);

    assert_eq!(a.id(), b.id());
    assert_ne!(a, b);
    a.set(2);
    assert_eq!(b.get(), 1);
    assert!(!left.same_runtime(&right));
}
