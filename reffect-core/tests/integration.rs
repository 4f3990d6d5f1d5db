//! Integration tests for the reactive engine.
//!
//! These exercise the full chain: cells, tracked functions, the tracking
//! context, reactive maps and read-only views working together.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use reffect_core::error::StoreError;
use reffect_core::reactive::{AsyncEffect, Effect, Ref};
use reffect_core::store::{ActionRegistry, ReactiveMap, ReadOnlyView};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

/// The counter scenario: one explicit invoke establishes the dependency,
/// after which writes re-run the effect with no further calls.
#[test]
fn effect_reruns_when_dependency_changes() {
    let counter = Ref::new(0);
    let recorded = Arc::new(AtomicI32::new(-1));

    let counter_in_body = counter.clone();
    let recorded_in_body = recorded.clone();
    let effect = Effect::new(move || {
        recorded_in_body.store(counter_in_body.get(), Ordering::SeqCst);
    });

    effect.invoke();
    assert_eq!(recorded.load(Ordering::SeqCst), 0);

    counter.set(5);
    assert_eq!(recorded.load(Ordering::SeqCst), 5);
}

#[test]
fn equal_write_triggers_no_rerun() {
    let cell = Ref::new(7);
    let runs = Arc::new(AtomicI32::new(0));

    let cell_in_body = cell.clone();
    let runs_in_body = runs.clone();
    let effect = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        cell_in_body.get();
    });

    effect.invoke();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    cell.set(7);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    cell.set(8);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Dependency sets are rebuilt per run, not accumulated: once the body
/// stops reading a cell, writes to it stop re-running the effect.
#[test]
fn dependencies_are_recomputed_per_run() {
    let use_b = Ref::new(true);
    let a = Ref::new(1);
    let b = Ref::new(10);
    let runs = Arc::new(AtomicI32::new(0));
    let observed = Arc::new(AtomicI32::new(0));

    let use_b_in_body = use_b.clone();
    let a_in_body = a.clone();
    let b_in_body = b.clone();
    let runs_in_body = runs.clone();
    let observed_in_body = observed.clone();
    let effect = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        let value = if use_b_in_body.get() {
            a_in_body.get() + b_in_body.get()
        } else {
            a_in_body.get()
        };
        observed_in_body.store(value, Ordering::SeqCst);
    });

    effect.invoke();
    assert_eq!(observed.load(Ordering::SeqCst), 11);

    b.set(20);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(observed.load(Ordering::SeqCst), 21);

    // Flip the branch: the rebuilt dependency set no longer contains `b`.
    use_b.set(false);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    b.set(30);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    a.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[test]
fn stopped_effect_never_refires() {
    let a = Ref::new(0);
    let b = Ref::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let a_in_body = a.clone();
    let b_in_body = b.clone();
    let runs_in_body = runs.clone();
    let effect = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        a_in_body.get();
        b_in_body.get();
    });

    effect.invoke();
    effect.stop();

    a.set(1);
    b.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn stopping_one_effect_leaves_the_other_subscribed() {
    let cell = Ref::new(0);
    let first_runs = Arc::new(AtomicI32::new(0));
    let second_runs = Arc::new(AtomicI32::new(0));

    let cell_for_first = cell.clone();
    let first_runs_in_body = first_runs.clone();
    let first = Effect::new(move || {
        first_runs_in_body.fetch_add(1, Ordering::SeqCst);
        cell_for_first.get();
    });

    let cell_for_second = cell.clone();
    let second_runs_in_body = second_runs.clone();
    let second = Effect::new(move || {
        second_runs_in_body.fetch_add(1, Ordering::SeqCst);
        cell_for_second.get();
    });

    first.invoke();
    second.invoke();

    cell.set(1);
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(second_runs.load(Ordering::SeqCst), 2);

    first.stop();
    cell.set(2);
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(second_runs.load(Ordering::SeqCst), 3);
}

/// Direct subscribers are notified before dependent effects within one
/// notification pass.
#[test]
fn subscribers_run_before_dependents() {
    let cell = Ref::new(0);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let order_in_subscriber = order.clone();
    cell.subscribe(move |_, _| {
        order_in_subscriber.lock().push("subscriber");
    });

    let cell_in_body = cell.clone();
    let order_in_effect = order.clone();
    let effect = Effect::new(move || {
        cell_in_body.get();
        order_in_effect.lock().push("effect");
    });

    effect.invoke();
    order.lock().clear();

    cell.set(1);
    assert_eq!(*order.lock(), vec!["subscriber", "effect"]);
}

#[test]
fn nested_map_field_invalidates_only_its_readers() {
    let map = ReactiveMap::from_value(json!({"a": {"b": 1}, "other": 0})).unwrap();
    let runs = Arc::new(AtomicI32::new(0));
    let observed = Arc::new(AtomicI32::new(0));

    let map_in_body = map.clone();
    let runs_in_body = runs.clone();
    let observed_in_body = observed.clone();
    let reader = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        let value = map_in_body.get_path("a.b").unwrap();
        observed_in_body.store(value.as_i64().unwrap() as i32, Ordering::SeqCst);
    });

    reader.invoke();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    map.set_path("a.b", 2).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    // Equal write on the same leaf stays silent.
    map.set_path("a.b", 2).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Unrelated key: no re-run of this reader.
    map.set("other", 99);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Overwriting a scalar entry with a container replaces the leaf cell, but
/// the reader of the old leaf must still see the write.
#[test]
fn replacing_a_leaf_with_a_container_reruns_its_reader() {
    let map = ReactiveMap::from_value(json!({"name": "alice"})).unwrap();
    let runs = Arc::new(AtomicI32::new(0));

    let map_in_body = map.clone();
    let runs_in_body = runs.clone();
    let reader = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        let _ = map_in_body.get("name");
    });

    reader.invoke();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    map.set("name", json!({"first": "alice"}));
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The re-run attached to the new cells: a write through the new
    // structure keeps re-running the reader.
    map.set_path("name.first", "bob").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Swapping out a whole subtree retires its cells: a reader of an inner
/// field observes the replacement instead of staying attached to the
/// dropped cell.
#[test]
fn replacing_a_subtree_reruns_readers_of_inner_fields() {
    let map = ReactiveMap::from_value(json!({"a": {"b": 1}})).unwrap();
    let runs = Arc::new(AtomicI32::new(0));
    let observed = Arc::new(AtomicI32::new(0));

    let map_in_body = map.clone();
    let runs_in_body = runs.clone();
    let observed_in_body = observed.clone();
    let reader = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        let value = map_in_body.get_path("a.b").unwrap();
        observed_in_body.store(value.as_i64().unwrap() as i32, Ordering::SeqCst);
    });

    reader.invoke();
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    map.set("a", json!({"b": 2}));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    // And the reader is live on the new subtree, not the retired one.
    map.set_path("a.b", 3).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 3);
}

/// A snapshot of a container depends on its structure as well as on its
/// leaves: inserting or removing a key re-runs the snapshot reader.
#[test]
fn container_snapshot_tracks_structure_changes() {
    let map = ReactiveMap::from_value(json!({"profile": {"theme": "dark"}})).unwrap();
    let runs = Arc::new(AtomicI32::new(0));

    let map_in_body = map.clone();
    let runs_in_body = runs.clone();
    let reader = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        let _ = map_in_body.get("profile");
    });

    reader.invoke();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let profile = map.map("profile").unwrap();
    profile.set("lang", "en");
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    profile.remove("lang").unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn map_len_is_tracked_through_structure_changes() {
    let map = ReactiveMap::from_value(json!({"a": 1})).unwrap();
    let observed_len = Arc::new(AtomicI32::new(0));

    let map_in_body = map.clone();
    let observed_in_body = observed_len.clone();
    let effect = Effect::new(move || {
        observed_in_body.store(map_in_body.len() as i32, Ordering::SeqCst);
    });

    effect.invoke();
    assert_eq!(observed_len.load(Ordering::SeqCst), 1);

    map.set("b", 2);
    assert_eq!(observed_len.load(Ordering::SeqCst), 2);

    map.remove("a").unwrap();
    assert_eq!(observed_len.load(Ordering::SeqCst), 1);

    // Scalar overwrite of an existing leaf is not a structural change.
    map.set("b", 3);
    assert_eq!(observed_len.load(Ordering::SeqCst), 1);
}

#[test]
fn reading_a_removed_key_is_a_fault() {
    let map = ReactiveMap::from_value(json!({"a": 1})).unwrap();
    map.remove("a").unwrap();
    assert!(matches!(map.get("a"), Err(StoreError::KeyNotFound(_))));
}

#[test]
fn tracked_reader_follows_action_writes() {
    let state = ReactiveMap::from_value(json!({"count": 0})).unwrap();
    let actions = ActionRegistry::new().with("increment", |state: &ReactiveMap, _: &[Value]| {
        let next = state.get("count")?.as_i64().unwrap_or(0) + 1;
        state.set("count", next);
        Ok(Value::from(next))
    });
    let view = ReadOnlyView::new(state, actions);
    let observed = Arc::new(AtomicI32::new(-1));

    let view_in_body = view.clone();
    let observed_in_body = observed.clone();
    let effect = Effect::new(move || {
        let value = view_in_body.read("count").unwrap();
        observed_in_body.store(value.as_i64().unwrap() as i32, Ordering::SeqCst);
    });

    effect.invoke();
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    view.perform("increment", &[]).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    assert!(matches!(
        view.perform("decrement", &[]),
        Err(StoreError::UnknownAction(_))
    ));
}

/// A panicking subscriber propagates to the writer and aborts delivery to
/// the rest of the pass; the cell stays usable and the next write delivers
/// normally.
#[test]
fn panicking_subscriber_propagates_and_aborts_the_pass() {
    let cell = Ref::new(0);
    let downstream_runs = Arc::new(AtomicI32::new(0));

    let armed = Arc::new(AtomicBool::new(true));
    let armed_in_callback = armed.clone();
    cell.subscribe(move |_, _| {
        if armed_in_callback.load(Ordering::SeqCst) {
            panic!("subscriber failure");
        }
    });

    let cell_in_body = cell.clone();
    let runs_in_body = downstream_runs.clone();
    let effect = Effect::new(move || {
        runs_in_body.fetch_add(1, Ordering::SeqCst);
        cell_in_body.get();
    });
    effect.invoke();
    assert_eq!(downstream_runs.load(Ordering::SeqCst), 1);

    let write = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cell.set(1)));
    assert!(write.is_err());

    // The value changed, but delivery stopped at the panicking subscriber:
    // the dependent effect never ran in that pass.
    assert_eq!(cell.get_untracked(), 1);
    assert_eq!(downstream_runs.load(Ordering::SeqCst), 1);

    // The collections are intact: disarmed, the next write delivers to
    // both the subscriber and the still-registered dependent.
    armed.store(false, Ordering::SeqCst);
    cell.set(2);
    assert_eq!(downstream_runs.load(Ordering::SeqCst), 2);
}

/// Two threads running tracked functions at the same time each record only
/// their own dependencies.
#[test]
fn tracking_is_isolated_per_thread() {
    let cell_a = Ref::new(0);
    let cell_b = Ref::new(0);
    let runs_a = Arc::new(AtomicI32::new(0));
    let runs_b = Arc::new(AtomicI32::new(0));

    let cell_a_in_body = cell_a.clone();
    let runs_a_in_body = runs_a.clone();
    let effect_a = Effect::new(move || {
        runs_a_in_body.fetch_add(1, Ordering::SeqCst);
        cell_a_in_body.get();
    });

    let cell_b_in_body = cell_b.clone();
    let runs_b_in_body = runs_b.clone();
    let effect_b = Effect::new(move || {
        runs_b_in_body.fetch_add(1, Ordering::SeqCst);
        cell_b_in_body.get();
    });

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles = [
        {
            let effect = effect_a.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                effect.invoke();
            })
        },
        {
            let effect = effect_b.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                effect.invoke();
            })
        },
    ];
    for handle in handles {
        handle.join().unwrap();
    }

    cell_a.set(1);
    assert_eq!(runs_a.load(Ordering::SeqCst), 2);
    assert_eq!(runs_b.load(Ordering::SeqCst), 1);

    cell_b.set(1);
    assert_eq!(runs_a.load(Ordering::SeqCst), 2);
    assert_eq!(runs_b.load(Ordering::SeqCst), 2);
}

/// A write to a dependency of an async effect spawns the re-run and
/// returns without waiting for it.
#[tokio::test]
async fn async_effect_is_reinvoked_after_set() {
    let cell = Ref::new(0);
    let observed = Arc::new(AtomicI32::new(-1));

    let cell_in_body = cell.clone();
    let observed_in_body = observed.clone();
    let effect = AsyncEffect::new(move || {
        let cell = cell_in_body.clone();
        let observed = observed_in_body.clone();
        async move {
            tokio::task::yield_now().await;
            // Reads after a suspension point still track: the context
            // travels with the task, not the thread.
            let value = cell.get();
            observed.store(value, Ordering::SeqCst);
        }
    });

    effect.invoke().await;
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    cell.set(5);
    wait_until(|| observed.load(Ordering::SeqCst) == 5).await;
}

#[tokio::test]
async fn stopped_async_effect_is_not_rescheduled() {
    let cell = Ref::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    let cell_in_body = cell.clone();
    let runs_in_body = runs.clone();
    let effect = AsyncEffect::new(move || {
        let cell = cell_in_body.clone();
        let runs = runs_in_body.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            cell.get();
        }
    });

    effect.invoke().await;
    effect.stop();

    cell.set(1);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Dropping the last handle to an effect detaches it: dead weak entries
/// are pruned and the body never runs again.
#[test]
fn dropped_effect_is_pruned_from_dependents() {
    let cell = Ref::new(0);
    let runs = Arc::new(AtomicI32::new(0));

    {
        let cell_in_body = cell.clone();
        let runs_in_body = runs.clone();
        let effect = Effect::new(move || {
            runs_in_body.fetch_add(1, Ordering::SeqCst);
            cell_in_body.get();
        });
        effect.invoke();
    }

    cell.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
