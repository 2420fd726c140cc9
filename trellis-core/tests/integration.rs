//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and scopes work
//! together correctly.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use trellis_core::graph::{DirtyLevel, EffectId};
use trellis_core::reactive::{
    batch, on_scope_dispose, untracked, Computed, DebugHooks, DebugOp, DebuggerEvent, Effect,
    EffectOptions, EffectRef, EffectScope, Runtime, Signal,
};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Cell<u32>) {
    count.set(count.get() + 1);
}

/// Test that reading a signal many times in one run subscribes once.
#[test]
fn repeated_reads_register_one_subscription() {
    let signal = Signal::new(3);

    let effect = Effect::new({
        let signal = signal.clone();
        move || {
            for _ in 0..10 {
                signal.get();
            }
        }
    });

    assert_eq!(signal.subscriber_count(), 1);
    assert_eq!(effect.dependency_count(), 1);

    signal.set(4);
    assert_eq!(signal.subscriber_count(), 1);
    assert_eq!(effect.dependency_count(), 1);
}

/// Test that conditional reads only subscribe to the branch taken.
#[test]
fn dependencies_follow_the_branch_taken() {
    let cond = Signal::new(true);
    let a = Signal::new("a");
    let b = Signal::new("b");
    let seen = Rc::new(RefCell::new(Vec::new()));

    let effect = Effect::new({
        let (cond, a, b, seen) = (cond.clone(), a.clone(), b.clone(), seen.clone());
        move || {
            let value = if cond.get() { a.get() } else { b.get() };
            seen.borrow_mut().push(value);
        }
    });

    assert!(Runtime::is_subscribed(effect.id(), cond.id()));
    assert!(Runtime::is_subscribed(effect.id(), a.id()));
    assert!(!Runtime::is_subscribed(effect.id(), b.id()));

    cond.set(false);
    assert_eq!(Runtime::dependencies(effect.id()), vec![cond.id(), b.id()]);
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 1);

    // The abandoned branch no longer wakes the effect.
    a.set("a2");
    assert_eq!(*seen.borrow(), vec!["a", "b"]);

    b.set("b2");
    assert_eq!(*seen.borrow(), vec!["a", "b", "b2"]);
}

/// Test that an unchanged derived value does not re-run its readers.
#[test]
fn unchanged_computed_does_not_rerun_readers() {
    let source = Signal::new(10);
    let f_calls = counter();
    let g_calls = counter();

    let mid = Computed::new({
        let (source, f_calls) = (source.clone(), f_calls.clone());
        move || {
            bump(&f_calls);
            source.get() / 10
        }
    });
    let outer = Computed::new({
        let (mid, g_calls) = (mid.clone(), g_calls.clone());
        move || {
            bump(&g_calls);
            mid.get() + 1
        }
    });

    assert_eq!(outer.get(), 2);
    assert_eq!((f_calls.get(), g_calls.get()), (1, 1));

    source.set(15);
    assert_eq!(outer.dirty_level(), Some(DirtyLevel::MaybeDirty));
    assert_eq!(outer.get(), 2);
    assert_eq!((f_calls.get(), g_calls.get()), (2, 1));
    assert_eq!(outer.dirty_level(), Some(DirtyLevel::Clean));
}

/// Test that a chain of computeds validates once, back to the root.
#[test]
fn computed_chain_cascades_once() {
    let root = Signal::new(1);
    let calls = Rc::new(RefCell::new([0u32; 3]));

    let b = Computed::new({
        let (root, calls) = (root.clone(), calls.clone());
        move || {
            calls.borrow_mut()[0] += 1;
            root.get()
        }
    });
    let c = Computed::new({
        let (b, calls) = (b.clone(), calls.clone());
        move || {
            calls.borrow_mut()[1] += 1;
            b.get()
        }
    });
    let d = Computed::new({
        let (c, calls) = (c.clone(), calls.clone());
        move || {
            calls.borrow_mut()[2] += 1;
            c.get()
        }
    });

    assert_eq!(d.get(), 1);
    assert_eq!(*calls.borrow(), [1, 1, 1]);

    root.set(7);
    assert_eq!(d.get(), 7);
    assert_eq!(*calls.borrow(), [2, 2, 2]);

    // Nothing changed since: no further evaluation.
    assert_eq!(d.get(), 7);
    assert_eq!(*calls.borrow(), [2, 2, 2]);
}

/// Test that two writes before a flush produce a single re-run.
#[test]
fn writes_before_flush_coalesce() {
    let signal = Signal::new(0);
    let runs = counter();
    let scheduled = counter();
    let pending: Rc<RefCell<Vec<EffectRef>>> = Rc::new(RefCell::new(Vec::new()));

    let options = EffectOptions::new().scheduler({
        let (pending, scheduled) = (pending.clone(), scheduled.clone());
        move |effect: &EffectRef| {
            bump(&scheduled);
            pending.borrow_mut().push(effect.clone());
        }
    });
    let _effect = Effect::with_options(
        {
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                signal.get();
                bump(&runs);
            }
        },
        options,
    );
    assert_eq!(runs.get(), 1);

    signal.set(1);
    signal.set(2);
    assert_eq!(scheduled.get(), 1);

    let flush: Vec<EffectRef> = pending.borrow_mut().drain(..).collect();
    for effect in flush {
        effect.run_if_dirty();
    }
    assert_eq!(runs.get(), 2);
}

/// Test that batched writes run dependents once, after the batch.
#[test]
fn batch_defers_effects_until_the_end() {
    let first = Signal::new(1);
    let second = Signal::new(2);
    let sums = Rc::new(RefCell::new(Vec::new()));

    let _effect = Effect::new({
        let (first, second, sums) = (first.clone(), second.clone(), sums.clone());
        move || sums.borrow_mut().push(first.get() + second.get())
    });

    batch(|| {
        first.set(10);
        second.set(20);
        assert_eq!(Runtime::pending_jobs(), 1);
    });

    assert_eq!(*sums.borrow(), vec![3, 30]);
}

/// Test that stopping a scope tears down everything created in it.
#[test]
fn scope_stop_tears_down_everything() {
    let signal = Signal::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));
    let scope = EffectScope::new(false);

    let effects = scope
        .run(|| {
            let first = Effect::new({
                let signal = signal.clone();
                move || {
                    signal.get();
                }
            });
            on_scope_dispose(
                {
                    let order = order.clone();
                    move || order.borrow_mut().push("first")
                },
                false,
            );
            let second = Effect::new({
                let signal = signal.clone();
                move || {
                    signal.get();
                }
            });
            on_scope_dispose(
                {
                    let order = order.clone();
                    move || order.borrow_mut().push("second")
                },
                false,
            );
            (first, second)
        })
        .expect("scope is active");

    assert_eq!(signal.subscriber_count(), 2);
    assert_eq!(scope.effect_count(), 2);

    scope.stop();
    scope.stop();

    assert!(!effects.0.is_active());
    assert!(!effects.1.is_active());
    assert_eq!(signal.subscriber_count(), 0);
    assert_eq!(*order.borrow(), vec!["first", "second"]);
}

/// Test that a stopped effect still runs but tracks nothing.
#[test]
fn stopped_effect_runs_untracked() {
    let signal = Signal::new(2);
    let runs = counter();

    let effect = Effect::new({
        let (signal, runs) = (signal.clone(), runs.clone());
        move || {
            bump(&runs);
            signal.get() * 3
        }
    });
    effect.stop();

    assert_eq!(effect.run(), 6);
    assert_eq!(signal.subscriber_count(), 0);
    assert_eq!(effect.dependency_count(), 0);

    signal.set(5);
    assert_eq!(runs.get(), 2);
    assert_eq!(effect.run(), 15);
}

/// Test that NaN equals itself but signed zeros differ.
#[test]
fn float_writes_follow_same_value_equality() {
    let signal = Signal::new(f64::NAN);
    let runs = counter();

    let _effect = Effect::new({
        let (signal, runs) = (signal.clone(), runs.clone());
        move || {
            signal.get();
            bump(&runs);
        }
    });

    signal.set(f64::NAN);
    assert_eq!(runs.get(), 1);

    signal.set(0.0);
    assert_eq!(runs.get(), 2);

    signal.set(-0.0);
    assert_eq!(runs.get(), 3);

    signal.set(-0.0);
    assert_eq!(runs.get(), 3);
}

/// Test the sign/message scenario end to end.
#[test]
fn sign_message_scenario() {
    let a = Signal::new(1);
    let pos_calls = counter();
    let msg_calls = counter();
    let observed = Rc::new(RefCell::new(Vec::new()));

    let pos = Computed::new({
        let (a, pos_calls) = (a.clone(), pos_calls.clone());
        move || {
            bump(&pos_calls);
            a.get() > 0
        }
    });
    let msg = Computed::new({
        let (pos, msg_calls) = (pos.clone(), msg_calls.clone());
        move || {
            bump(&msg_calls);
            if pos.get() { "P" } else { "N" }
        }
    });
    let _effect = Effect::new({
        let (msg, observed) = (msg.clone(), observed.clone());
        move || observed.borrow_mut().push(msg.get())
    });

    assert_eq!(*observed.borrow(), vec!["P"]);

    a.set(2);
    assert_eq!(pos_calls.get(), 2);
    assert_eq!(msg_calls.get(), 1);
    assert_eq!(*observed.borrow(), vec!["P"]);

    a.set(-1);
    assert_eq!(pos_calls.get(), 3);
    assert_eq!(msg_calls.get(), 2);
    assert_eq!(*observed.borrow(), vec!["P", "N"]);
}

/// Test that a computed invalidated after validation checked it keeps its
/// reader stale.
#[test]
fn invalidation_after_check_is_not_lost() {
    let source = Signal::new(0);
    let toggle = Signal::new(0);
    let seen = Rc::new(Cell::new(-1));

    let mirror = Computed::new({
        let source = source.clone();
        move || source.get()
    });
    // Writes `source` from its getter, after `mirror` was already checked.
    let writer = Computed::new({
        let (source, toggle) = (source.clone(), toggle.clone());
        move || {
            if toggle.get() == 1 {
                untracked(|| source.set(100));
            }
            0
        }
    });
    let effect = Effect::new({
        let (mirror, writer, seen) = (mirror.clone(), writer.clone(), seen.clone());
        move || {
            seen.set(mirror.get());
            writer.get();
        }
    });
    assert_eq!(seen.get(), 0);

    toggle.set(1);
    assert_eq!(seen.get(), 0);
    assert_eq!(mirror.dirty_level(), Some(DirtyLevel::Dirty));
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::MaybeDirty));

    // The next validation finds the change in `mirror`.
    assert!(effect.is_dirty());
    effect.run();
    assert_eq!(seen.get(), 100);
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::Clean));
}

/// Test that validation re-entering the effect being validated resolves
/// as clean instead of recursing.
#[test]
fn reentrant_validation_resolves_as_clean() {
    let signal = Signal::new(1);
    let target: Rc<Cell<Option<EffectId>>> = Rc::new(Cell::new(None));
    let nested_checks = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::new(Cell::new(0));

    let doubled = Computed::new({
        let (signal, target, nested_checks) =
            (signal.clone(), target.clone(), nested_checks.clone());
        move || {
            if let Some(id) = target.get() {
                let level = Runtime::dirty_level(id);
                nested_checks.borrow_mut().push((level, Runtime::is_dirty(id)));
            }
            signal.get() * 2
        }
    });
    let effect = Effect::new_lazy({
        let (doubled, seen) = (doubled.clone(), seen.clone());
        move || seen.set(doubled.get())
    });
    target.set(Some(effect.id()));
    effect.run();
    assert_eq!(seen.get(), 2);
    nested_checks.borrow_mut().clear();

    signal.set(2);

    assert_eq!(
        *nested_checks.borrow(),
        vec![(Some(DirtyLevel::Querying), false)]
    );
    assert_eq!(seen.get(), 4);
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::Clean));
}

/// Test that a getter writing its own input leaves its readers to
/// re-verify rather than re-running them.
#[test]
fn self_writing_computed_leaves_reader_to_reverify() {
    let raw = Signal::new(-5);
    let getter_calls = counter();
    let runs = counter();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let clamped = Computed::new({
        let (raw, getter_calls) = (raw.clone(), getter_calls.clone());
        move || {
            bump(&getter_calls);
            let value = raw.get();
            if value < 0 {
                raw.set(0);
            }
            value.max(0)
        }
    });
    let effect = Effect::new({
        let (clamped, runs, seen) = (clamped.clone(), runs.clone(), seen.clone());
        move || {
            bump(&runs);
            seen.borrow_mut().push(clamped.get());
        }
    });

    assert_eq!(*seen.borrow(), vec![0]);
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::MaybeDirtySideEffect));
    assert_eq!(Runtime::pending_jobs(), 0);
    assert_eq!(runs.get(), 1);

    // Re-verification recomputes once and finds nothing new.
    assert!(!effect.is_dirty());
    assert_eq!(getter_calls.get(), 2);
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::Clean));
    assert_eq!(runs.get(), 1);

    raw.set(7);
    assert_eq!(*seen.borrow(), vec![0, 7]);
    assert_eq!(runs.get(), 2);
}

/// Test that reads inside `untracked` do not subscribe.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Signal::new(1);
    let ignored = Signal::new(1);
    let runs = counter();

    let _effect = Effect::new({
        let (tracked, ignored, runs) = (tracked.clone(), ignored.clone(), runs.clone());
        move || {
            tracked.get();
            untracked(|| ignored.get());
            bump(&runs);
        }
    });

    ignored.set(2);
    assert_eq!(runs.get(), 1);
    assert_eq!(ignored.subscriber_count(), 0);

    tracked.set(2);
    assert_eq!(runs.get(), 2);
}

/// Test that debug hooks report tracks and triggers, and serialize.
#[test]
fn debug_hooks_report_events() {
    let signal = Signal::new(1);
    let events: Rc<RefCell<Vec<DebuggerEvent>>> = Rc::new(RefCell::new(Vec::new()));

    let hooks = DebugHooks::new()
        .on_track({
            let events = events.clone();
            move |event| events.borrow_mut().push(*event)
        })
        .on_trigger({
            let events = events.clone();
            move |event| events.borrow_mut().push(*event)
        });
    let effect = Effect::with_options(
        {
            let signal = signal.clone();
            move || {
                signal.get();
            }
        },
        EffectOptions::new().debug(hooks),
    );

    signal.set(2);

    let events = events.borrow();
    let ops: Vec<DebugOp> = events.iter().map(|event| event.op).collect();
    assert_eq!(ops, vec![DebugOp::Get, DebugOp::Set, DebugOp::Get]);
    assert!(events.iter().all(|event| event.effect == effect.id()));
    assert!(events.iter().all(|event| event.source == signal.id()));

    let json = serde_json::to_value(events[1]).expect("event serializes");
    assert_eq!(json["op"], "set");
    assert_eq!(json["level"], "Dirty");
}

/// Test that a panicking run keeps the reads made before the panic.
#[test]
fn panicking_run_keeps_reads_before_the_panic() {
    let fail = Signal::new(false);
    let other = Signal::new(0);

    let effect = Effect::new({
        let (fail, other) = (fail.clone(), other.clone());
        move || {
            if fail.get() {
                panic!("effect failed");
            }
            other.get();
        }
    });
    assert_eq!(effect.dependency_count(), 2);

    let result = panic::catch_unwind(AssertUnwindSafe(|| fail.set(true)));
    assert!(result.is_err());

    assert_eq!(Runtime::dependencies(effect.id()), vec![fail.id()]);
    assert_eq!(other.subscriber_count(), 0);
    assert_eq!(Runtime::pending_jobs(), 0);

    fail.set(false);
    assert_eq!(effect.dependency_count(), 2);
    assert_eq!(other.subscriber_count(), 1);
}

/// Test that a panic during validation leaves the reader retryable.
#[test]
fn panicking_validation_restores_the_level() {
    let input = Signal::new(1);
    let seen = Rc::new(Cell::new(0));

    let scaled = Computed::new({
        let input = input.clone();
        move || {
            let value = input.get();
            assert!(value >= 0, "negative input");
            value * 10
        }
    });
    let effect = Effect::new({
        let (scaled, seen) = (scaled.clone(), seen.clone());
        move || seen.set(scaled.get())
    });
    assert_eq!(seen.get(), 10);

    let result = panic::catch_unwind(AssertUnwindSafe(|| input.set(-1)));
    assert!(result.is_err());
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::MaybeDirty));

    input.set(2);
    assert!(effect.to_ref().run_if_dirty());
    assert_eq!(seen.get(), 20);
    assert_eq!(effect.dirty_level(), Some(DirtyLevel::Clean));
}

/// Test that an effect created lazily only runs on demand.
#[test]
fn lazy_effect_waits_for_first_run() {
    let signal = Signal::new(1);
    let runs = counter();

    let effect = Effect::new_lazy({
        let (signal, runs) = (signal.clone(), runs.clone());
        move || {
            bump(&runs);
            signal.get()
        }
    });
    assert_eq!(runs.get(), 0);
    assert_eq!(signal.subscriber_count(), 0);

    assert_eq!(effect.run(), 1);
    signal.set(2);
    assert_eq!(runs.get(), 2);
}

/// Test that effects nested in other effects track independently.
#[test]
fn nested_effects_track_independently() {
    let outer_signal = Signal::new(0);
    let inner_signal = Signal::new(0);
    let inner_effect: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
    let inner_runs = counter();

    let outer = Effect::new({
        let (outer_signal, inner_signal) = (outer_signal.clone(), inner_signal.clone());
        let (inner_effect, inner_runs) = (inner_effect.clone(), inner_runs.clone());
        move || {
            outer_signal.get();
            if inner_effect.borrow().is_none() {
                let effect = Effect::new({
                    let (inner_signal, inner_runs) = (inner_signal.clone(), inner_runs.clone());
                    move || {
                        inner_signal.get();
                        bump(&inner_runs);
                    }
                });
                *inner_effect.borrow_mut() = Some(effect);
            }
        }
    });

    assert_eq!(Runtime::dependencies(outer.id()), vec![outer_signal.id()]);
    assert_eq!(inner_signal.subscriber_count(), 1);

    inner_signal.set(1);
    assert_eq!(inner_runs.get(), 2);
    assert_eq!(outer_signal.subscriber_count(), 1);
}
