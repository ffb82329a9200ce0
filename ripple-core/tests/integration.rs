//! Integration Tests for the Reactive System
//!
//! These tests drive instances, watchers and the scheduler together through
//! the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ripple_core::observer::slot_dep;
use ripple_core::reactive::ReactiveContext;
use ripple_core::{
    del, set, ComputedDef, Config, Expr, Instance, InstanceOptions, Object, ReactiveError, Runtime, TokioTick,
    Value, WatchOptions,
};

fn instance(runtime: &Runtime, json: serde_json::Value) -> Instance {
    let data = Value::from_json(json).as_object().cloned().unwrap_or_default();
    Instance::new(runtime, InstanceOptions::new().data(data)).unwrap()
}

fn recorder() -> (Arc<Mutex<Vec<(Value, Value)>>>, impl Fn(&Value, &Value) -> Result<(), ripple_core::BoxError>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, move |new: &Value, old: &Value| {
        sink.lock().push((new.clone(), old.clone()));
        Ok(())
    })
}

/// Test that a watcher only depends on what its last evaluation read.
#[test]
fn dependencies_are_minimal_and_self_pruning() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "ok": true, "a": 1, "b": 2 }));
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    vm.watch(
        Expr::func(move |vm| {
            counter.fetch_add(1, Ordering::SeqCst);
            if vm.get("ok").is_truthy() {
                vm.get("a")
            } else {
                vm.get("b")
            }
        }),
        |_, _| Ok(()),
        WatchOptions::default(),
    )
    .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Not read yet: no re-run.
    vm.set("b", 3);
    runtime.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    vm.set("ok", false);
    runtime.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // No longer read: no re-run.
    vm.set("a", 10);
    runtime.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(slot_dep(vm.data(), "a").unwrap().subscriber_count(), 0);
}

/// Test that many writes in one turn produce a single run with the final
/// value.
#[test]
fn writes_in_one_turn_are_batched() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "n": 0 }));
    let (log, callback) = recorder();
    vm.watch("n", callback, WatchOptions::default()).unwrap();

    for i in 1..=50 {
        vm.set("n", i);
    }
    assert!(log.lock().is_empty());
    runtime.tick().unwrap();

    assert_eq!(*log.lock(), vec![(Value::from(50), Value::from(0))]);
}

/// Test that writing a value equal to the current one notifies nobody,
/// NaN included.
#[test]
fn same_value_writes_do_not_notify() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "x": 1 }));
    vm.set("x", f64::NAN);
    let (log, callback) = recorder();
    vm.watch(
        "x",
        callback,
        WatchOptions {
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    vm.set("x", f64::NAN);
    assert!(log.lock().is_empty());
    assert_eq!(runtime.queued_watchers(), 0);
}

/// Test that a deep watch reacts to nested writes.
#[test]
fn deep_watch_sees_nested_writes() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": { "b": { "c": 1 } } }));
    let (deep_log, deep_cb) = recorder();
    let (shallow_log, shallow_cb) = recorder();
    vm.watch(
        "a",
        deep_cb,
        WatchOptions {
            deep: true,
            ..Default::default()
        },
    )
    .unwrap();
    vm.watch("a", shallow_cb, WatchOptions::default()).unwrap();

    let b = vm.get("a").property("b");
    b.as_object().unwrap().set("c", 2);
    runtime.tick().unwrap();

    assert_eq!(deep_log.lock().len(), 1);
    assert!(shallow_log.lock().is_empty());
}

/// Test that array mutations notify once per flush and wrap inserted
/// values.
#[test]
fn array_mutations_notify_and_wrap() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "items": [] }));
    let (log, callback) = recorder();
    vm.watch("items", callback, WatchOptions::default()).unwrap();
    let sync_runs = Arc::new(AtomicUsize::new(0));
    let counter = sync_runs.clone();
    vm.watch(
        "items",
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        WatchOptions {
            sync: true,
            ..Default::default()
        },
    )
    .unwrap();

    let items = vm.get("items");
    let items = items.as_array().unwrap();
    let pushed: Object = [("id", 1)].into_iter().collect();
    items.push(pushed.clone());
    assert_eq!(sync_runs.load(Ordering::SeqCst), 1);
    items.push(2);
    runtime.tick().unwrap();

    assert_eq!(log.lock().len(), 1);
    assert!(pushed.observer().is_some());
    assert_eq!(items.len(), 2);
}

/// Test that a watcher panicking mid-flush does not leave the queue stuck.
#[test]
fn panicking_watcher_leaves_queue_usable() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": 1, "b": 1 }));
    vm.mount(
        |vm| {
            if vm.get("a") == Value::from(2) {
                panic!("render failed");
            }
            Value::Undefined
        },
        |_, _| {},
    );
    let (log, callback) = recorder();
    vm.watch("b", callback, WatchOptions::default()).unwrap();

    vm.set("a", 2);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runtime.tick()));
    assert!(result.is_err());
    assert_eq!(runtime.queued_watchers(), 0);

    vm.set("b", 2);
    assert!(runtime.has_pending_tick());
    runtime.tick().unwrap();
    assert_eq!(*log.lock(), vec![(Value::from(2), Value::from(1))]);
}

/// Test that nested arrays fan out to watchers of the outer array.
#[test]
fn nested_array_mutations_reach_outer_watchers() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "grid": [[1], [2]] }));
    let (log, callback) = recorder();
    vm.watch("grid", callback, WatchOptions::default()).unwrap();

    let row = vm.get("grid").as_array().unwrap().get(0);
    row.as_array().unwrap().push(3);
    runtime.tick().unwrap();

    assert_eq!(log.lock().len(), 1);
}

/// Test that a computed property is evaluated once and cached until a
/// dependency changes.
#[test]
fn computed_is_lazy_and_cached() {
    let runtime = Runtime::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let data: Object = [("price", 3), ("qty", 2)].into_iter().collect();
    let vm = Instance::new(
        &runtime,
        InstanceOptions::new().data(data).computed(
            "total",
            ComputedDef::getter(move |vm| {
                counter.fetch_add(1, Ordering::SeqCst);
                let price = vm.get("price").as_number().unwrap_or(0.0);
                let qty = vm.get("qty").as_number().unwrap_or(0.0);
                Value::from(price * qty)
            }),
        ),
    )
    .unwrap();

    for _ in 0..5 {
        assert_eq!(vm.get("total"), Value::from(6));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    vm.set("qty", 4);
    vm.set("price", 5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(vm.get("total"), Value::from(20));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test that a watcher torn down twice stays torn down.
#[test]
fn unwatch_is_idempotent() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": 1 }));
    let (log, callback) = recorder();
    let handle = vm.watch("a", callback, WatchOptions::default()).unwrap();

    vm.set("a", 2);
    handle.unwatch();
    handle.unwatch();
    runtime.tick().unwrap();

    assert!(log.lock().is_empty());
    assert!(!handle.is_active());
}

/// Test that watchers run in creation order regardless of notification
/// order.
#[test]
fn flush_runs_watchers_in_creation_order() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": 1, "b": 1 }));
    let order = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (order.clone(), order.clone());
    vm.watch(
        "a",
        move |_, _| {
            first.lock().push("w1");
            Ok(())
        },
        WatchOptions::default(),
    )
    .unwrap();
    vm.watch(
        "b",
        move |_, _| {
            second.lock().push("w2");
            Ok(())
        },
        WatchOptions::default(),
    )
    .unwrap();

    vm.set("b", 2);
    vm.set("a", 2);
    runtime.tick().unwrap();

    assert_eq!(*order.lock(), vec!["w1", "w2"]);
}

/// Test that a watcher triggered by another watcher's callback runs in
/// the same flush.
#[test]
fn watchers_queued_mid_flush_join_the_flush() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "source": 1, "mirror": 1 }));
    let data = vm.data().clone();
    vm.watch(
        "source",
        move |new, _| {
            data.set("mirror", new.clone());
            Ok(())
        },
        WatchOptions::default(),
    )
    .unwrap();
    let (log, callback) = recorder();
    vm.watch("mirror", callback, WatchOptions::default()).unwrap();

    vm.set("source", 7);
    runtime.tick().unwrap();

    assert_eq!(*log.lock(), vec![(Value::from(7), Value::from(1))]);
    assert!(!runtime.has_pending_tick());
}

/// Test that a watcher that keeps re-triggering itself is cut off.
#[test]
fn infinite_update_loops_are_capped() {
    let runtime = Runtime::with_config(Config {
        max_update_count: 10,
        ..Config::default()
    });
    let vm = instance(&runtime, serde_json::json!({ "n": 0 }));
    let data = vm.data().clone();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    vm.watch(
        "n",
        move |new, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            data.set("n", new.as_number().unwrap_or(0.0) + 1.0);
            Ok(())
        },
        WatchOptions::default(),
    )
    .unwrap();

    vm.set("n", 1);
    let err = runtime.tick().unwrap_err();

    assert!(matches!(err, ReactiveError::InfiniteUpdateLoop { count: 11, .. }));
    assert_eq!(runs.load(Ordering::SeqCst), 11);
    assert_eq!(runtime.queued_watchers(), 0);
}

/// Test that a failing user callback does not stop the rest of the flush.
#[test]
fn failing_callbacks_are_contained() {
    let runtime = Runtime::new();
    let reported = Arc::new(AtomicUsize::new(0));
    let sink = reported.clone();
    runtime.set_error_handler(move |err, _| {
        assert!(matches!(err, ReactiveError::Callback { .. }));
        sink.fetch_add(1, Ordering::SeqCst);
    });
    let vm = instance(&runtime, serde_json::json!({ "a": 1 }));
    vm.watch("a", |_, _| Err("broken watcher".into()), WatchOptions::default())
        .unwrap();
    let (log, callback) = recorder();
    vm.watch("a", callback, WatchOptions::default()).unwrap();

    vm.set("a", 2);
    runtime.tick().unwrap();
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(log.lock().len(), 1);

    runtime.clear_error_handler();
    vm.set("a", 3);
    assert!(runtime.tick().is_err());
    assert_eq!(log.lock().len(), 2);
}

/// Test that structural set/del notify observers of the container.
#[test]
fn structural_set_and_delete_notify() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "user": { "name": "ada" } }));
    let (log, callback) = recorder();
    vm.watch(
        "user",
        callback,
        WatchOptions {
            deep: true,
            ..Default::default()
        },
    )
    .unwrap();

    let user = vm.get("user");
    set(&user, "email", "ada@example.com");
    runtime.tick().unwrap();
    assert_eq!(log.lock().len(), 1);
    assert!(slot_dep(user.as_object().unwrap(), "email").is_some());

    del(&user, "email");
    runtime.tick().unwrap();
    assert_eq!(log.lock().len(), 2);
    assert!(!user.as_object().unwrap().contains_key("email"));

    del(&user, "missing");
    runtime.tick().unwrap();
    assert_eq!(log.lock().len(), 2);
}

/// Test that root data refuses new keys.
#[test]
fn root_data_rejects_structural_additions() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": 1 }));
    let root = Value::Object(vm.data().clone());

    set(&root, "b", 2);
    assert!(!vm.data().contains_key("b"));
    set(&Value::Object(vm.object().clone()), "c", 3);
    assert!(vm.get("c").is_undefined());
}

/// Test that array elements set by index notify through splice.
#[test]
fn set_on_array_index_grows_and_notifies() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "list": [1] }));
    let (log, callback) = recorder();
    vm.watch("list", callback, WatchOptions::default()).unwrap();

    let list = vm.get("list");
    set(&list, 3usize, "d");
    runtime.tick().unwrap();

    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 4);
    assert_eq!(list.get(3), Value::from("d"));
    assert!(list.get(2).is_undefined());
    assert_eq!(log.lock().len(), 1);
}

/// Test the watch path form against nested data and array indices.
#[test]
fn watch_paths_resolve_nested_values() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "rows": [{ "label": "x" }] }));
    let handle = vm.watch("rows.0.label", |_, _| Ok(()), WatchOptions::default()).unwrap();
    assert_eq!(handle.value(), Value::from("x"));

    let missing = vm.watch("nothing.here", |_, _| Ok(()), WatchOptions::default()).unwrap();
    assert!(missing.value().is_undefined());
}

/// Test that frozen data is never wrapped.
#[test]
fn frozen_objects_are_left_alone() {
    let runtime = Runtime::new();
    let frozen: Object = [("a", 1)].into_iter().collect();
    frozen.freeze();
    let data: Object = [("config", Value::from(frozen.clone()))].into_iter().collect();
    let _vm = Instance::new(&runtime, InstanceOptions::new().data(data)).unwrap();

    assert!(frozen.observer().is_none());
    assert!(slot_dep(&frozen, "a").is_none());
}

/// Test that the evaluation stack is clean after a flush.
#[test]
fn no_target_leaks_out_of_a_flush() {
    let runtime = Runtime::new();
    let vm = instance(&runtime, serde_json::json!({ "a": [1, 2, 3] }));
    vm.mount(|vm| vm.get("a"), |_, _| {});
    if let Value::Array(items) = vm.get("a") {
        items.reverse();
    }
    runtime.tick().unwrap();
    assert!(!ReactiveContext::is_active());
    assert_eq!(ReactiveContext::depth(), 0);
}

/// Test that the tokio tick strategy drains after the current task yields.
#[tokio::test]
async fn tokio_tick_flushes_after_yield() {
    let runtime = Runtime::with_tick(Config::default(), TokioTick::current().unwrap());
    let vm = instance(&runtime, serde_json::json!({ "n": 0 }));
    let (log, callback) = recorder();
    vm.watch("n", callback, WatchOptions::default()).unwrap();

    vm.set("n", 1);
    vm.set("n", 2);
    assert!(runtime.has_pending_tick());
    assert!(log.lock().is_empty());

    for _ in 0..10 {
        if !log.lock().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(*log.lock(), vec![(Value::from(2), Value::from(0))]);
    assert!(!runtime.has_pending_tick());
}

/// Test that the tokio tick strategy refuses a multi-thread runtime, where a
/// worker could flush in the middle of a synchronous turn.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_tick_refuses_multi_thread_runtime() {
    assert!(matches!(TokioTick::current(), Err(ReactiveError::TokioRuntime(_))));
}
