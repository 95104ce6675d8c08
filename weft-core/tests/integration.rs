//! Integration Tests for Reactive System
//!
//! These tests verify that proxies, refs, computeds, effects and watchers
//! work together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use weft_core::reactive::{
    computed, effect, effect_with, is_reactive, is_readonly, reactive, readonly, ref_, to_raw,
    untracked, EffectOptions, Proxy, ReactiveContext, Scheduler,
};
use weft_core::runtime::{flush_jobs, next_tick, watch, WatchOptions};
use weft_core::{PropKey, Value};

fn proxy_of(value: &Value) -> Proxy {
    value.as_proxy().expect("proxy").clone()
}

fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let count = Arc::new(AtomicI32::new(0));
    (count.clone(), count)
}

/// Wrapping the same object twice yields the same proxy.
#[test]
fn wrapping_is_idempotent() {
    let raw = Value::from(json!({"a": 1}));
    let wrapped = reactive(raw.clone());

    assert_eq!(reactive(wrapped.clone()), wrapped);
    assert_eq!(reactive(raw.clone()), wrapped);
    assert_eq!(to_raw(&wrapped), raw);
}

/// A read-only view over a reactive proxy still reports reactive.
#[test]
fn readonly_of_reactive_reports_reactive() {
    let wrapped = reactive(json!({"a": 1}));
    let frozen = readonly(wrapped.clone());

    assert!(is_reactive(&frozen));
    assert!(is_readonly(&frozen));
    assert_ne!(frozen, wrapped);
}

/// Reading registers, writing a new value re-runs once, writing the same
/// value does nothing.
#[test]
fn track_trigger_round_trip() {
    let state = proxy_of(&reactive(json!({"a": 1})));
    let (runs, runs_clone) = counter();

    let state_clone = state.clone();
    let _runner = effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        state_clone.get("a");
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("a", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("a", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// An effect that writes what it reads does not recurse.
#[test]
fn self_trigger_is_suppressed() {
    let state = proxy_of(&reactive(json!({"n": 0})));
    let (runs, runs_clone) = counter();

    let state_clone = state.clone();
    let _runner = effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let n = state_clone.get("n").as_i64().unwrap_or(0);
        state_clone.set("n", n + 1);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(state.get("n"), Value::from(1));

    state.set("n", 10);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(state.get("n"), Value::from(11));
}

/// Pushing notifies readers of `length`.
#[test]
fn array_length_correlation() {
    let arr = proxy_of(&reactive(json!([1, 2])));
    let (runs, runs_clone) = counter();
    let seen_len = Arc::new(AtomicI32::new(0));

    let arr_clone = arr.clone();
    let seen_clone = seen_len.clone();
    let _runner = effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        seen_clone.store(arr_clone.len() as i32, Ordering::SeqCst);
    });

    arr.push([3]).expect("array");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen_len.load(Ordering::SeqCst), 3);
}

/// Object fields unwrap refs; array elements do not.
#[test]
fn ref_unwrap_nesting() {
    let obj = proxy_of(&reactive(json!({})));
    obj.set("r", ref_(1));
    assert_eq!(obj.get("r"), Value::from(1));

    let arr = proxy_of(&reactive(json!([])));
    let r = ref_(1);
    arr.push([r.clone()]).expect("array");
    let element = arr.get(0usize);
    assert!(element.as_ref_cell().expect("ref").ptr_eq(&r));
}

/// The getter runs once per read after a change, however many writes.
#[test]
fn computed_laziness() {
    let base = ref_(1);
    let (calls, calls_clone) = counter();

    let base_clone = base.clone();
    let doubled = computed(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        base_clone.value().as_i64().unwrap_or(0) * 2
    });

    doubled.value();
    doubled.value();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    base.set_value(2);
    assert_eq!(doubled.value(), Value::from(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    for n in 0..5 {
        base.set_value(n + 10);
    }
    assert_eq!(doubled.value(), Value::from(28));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Two synchronous writes produce one callback with the end-to-end values.
#[test]
fn watch_batching() {
    let count = ref_(0);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let calls_clone = calls.clone();
    let _handle = watch(
        &count,
        move |new, old, _| calls_clone.lock().push((new, old)),
        WatchOptions::default(),
    );

    count.set_value(count.value().as_i64().unwrap_or(0) + 1);
    count.set_value(count.value().as_i64().unwrap_or(0) + 1);
    flush_jobs();

    assert_eq!(*calls.lock(), vec![(Value::from(2), Value::from(0))]);
}

/// Stopping before the flush cancels the queued callback.
#[test]
fn stop_cancels_pending() {
    let count = ref_(0);
    let (calls, calls_clone) = counter();

    let handle = watch(
        &count,
        move |_, _, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    count.set_value(1);
    count.set_value(2);
    handle.stop();
    flush_jobs();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// A deep watch fires on writes anywhere inside the source.
#[test]
fn deep_watch() {
    let state = proxy_of(&reactive(json!({"a": {"b": {"c": [1, 2]}}})));
    let (calls, calls_clone) = counter();

    let _handle = watch(
        state.clone(),
        move |_, _, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions {
            deep: true,
            ..Default::default()
        },
    );

    let c = proxy_of(&proxy_of(&proxy_of(&state.get("a")).get("b")).get("c"));
    c.set(1usize, 5);
    flush_jobs();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    state.set("top", true);
    flush_jobs();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// A branch that stops reading a slot no longer subscribes to it.
#[test]
fn stale_branches_are_unsubscribed() {
    let state = proxy_of(&reactive(json!({"ok": true, "text": "hello"})));
    let (runs, runs_clone) = counter();

    let state_clone = state.clone();
    let _runner = effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        if state_clone.get("ok").is_truthy() {
            state_clone.get("text");
        }
    });

    state.set("ok", false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("text", "world");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A panicking effect leaves the tracking context clean.
#[test]
fn panicking_effect_restores_context() {
    let state = proxy_of(&reactive(json!({"a": 1})));

    let state_clone = state.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _runner = effect::<_, ()>(move || {
            state_clone.get("a");
            panic!("effect failed");
        });
    }));

    assert!(result.is_err());
    assert!(!ReactiveContext::is_active());
    assert_eq!(ReactiveContext::depth(), 0);
}

/// Nested effects track into their own dependency sets.
#[test]
fn nested_effects() {
    let state = proxy_of(&reactive(json!({"outer": 1, "inner": 1})));
    let (outer_runs, outer_clone) = counter();
    let (inner_runs, inner_clone) = counter();
    let inner_slot = Arc::new(Mutex::new(None));

    let state_clone = state.clone();
    let slot_clone = inner_slot.clone();
    let _outer = effect(move || {
        outer_clone.fetch_add(1, Ordering::SeqCst);
        state_clone.get("outer");

        let state = state_clone.clone();
        let inner_clone = inner_clone.clone();
        let inner = effect(move || {
            inner_clone.fetch_add(1, Ordering::SeqCst);
            state.get("inner");
        });
        *slot_clone.lock() = Some(inner);
    });

    state.set("inner", 2);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 1);
    assert_eq!(inner_runs.load(Ordering::SeqCst), 2);

    state.set("outer", 2);
    assert_eq!(outer_runs.load(Ordering::SeqCst), 2);
}

/// A custom scheduler replaces the synchronous re-run.
#[test]
fn scheduler_defers_reruns() {
    let state = proxy_of(&reactive(json!({"a": 1})));
    let (runs, runs_clone) = counter();
    let (scheduled, scheduled_clone) = counter();

    let scheduler: Scheduler = Arc::new(move || {
        scheduled_clone.fetch_add(1, Ordering::SeqCst);
    });
    let state_clone = state.clone();
    let runner = effect_with(
        move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            state_clone.get("a");
        },
        EffectOptions {
            scheduler: Some(scheduler),
            ..Default::default()
        },
    );

    state.set("a", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(scheduled.load(Ordering::SeqCst), 1);

    runner.run();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Reads inside `untracked` do not subscribe.
#[test]
fn untracked_reads() {
    let state = proxy_of(&reactive(json!({"a": 1})));
    let (runs, runs_clone) = counter();

    let state_clone = state.clone();
    let _runner = effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        untracked(|| state_clone.get("a"));
    });

    state.set("a", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Shrinking an array through `length` notifies readers of cut indices.
#[test]
fn length_truncation() {
    let arr = proxy_of(&reactive(json!([1, 2, 3])));
    let last = Arc::new(Mutex::new(Value::Undefined));

    let arr_clone = arr.clone();
    let last_clone = last.clone();
    let _runner = effect(move || {
        *last_clone.lock() = arr_clone.get(2usize);
    });
    assert_eq!(*last.lock(), Value::from(3));

    arr.set(PropKey::length(), 1);
    assert_eq!(*last.lock(), Value::Undefined);
}

/// State serializes to JSON without tracking.
#[test]
fn json_snapshot() {
    let state = proxy_of(&reactive(json!({"list": [1, 2], "name": "weft"})));
    state.set("count", ref_(3));

    let runner = effect({
        let state = state.clone();
        move || {
            Value::Proxy(state.clone()).to_json();
        }
    });

    assert_eq!(runner.effect().dependency_count(), 0);
    assert_eq!(
        serde_json::to_value(Value::Proxy(state)).expect("serializable"),
        json!({"list": [1, 2], "name": "weft", "count": 3})
    );
}

/// Awaiting the next tick flushes queued watchers.
#[tokio::test]
async fn next_tick_runs_watchers() {
    let count = ref_(0);
    let (calls, calls_clone) = counter();

    let _handle = watch(
        &count,
        move |_, _, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    count.set_value(1);
    count.set_value(2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    next_tick().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
