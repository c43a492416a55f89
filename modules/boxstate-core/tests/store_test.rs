//! Dispatch/select engine behavior through the public facade.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use boxstate_core::{
    action, create_store, selector, Selector, StateBox, Store, StoreError, StoreOptions,
    Unsubscribe,
};
use boxstate_testing::{
    fail_with, merge_test, preloaded, preloaded_store, set_count, test_box, user_box, GreetsPatch,
    Notifications, TestState,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Flags {
    f: i32,
    n: i32,
    name: String,
}

// ---------------------------------------------------------------------------
// Selection and lazy materialization
// ---------------------------------------------------------------------------

#[test]
fn fresh_store_has_empty_snapshot() {
    let store = Store::new();
    assert!(store.snapshot().is_empty());
}

#[test]
fn select_materializes_only_the_selected_box() {
    let store = Store::new();
    let state = store.select(test_box()).unwrap();
    assert_eq!(state, TestState::default());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["test"]);
    assert_eq!(snapshot.get::<TestState>("test").unwrap(), Some(TestState::default()));
}

#[test]
fn preloaded_value_wins_over_initial_state() {
    let store = preloaded_store(json!({"test": {"greets": ["PRELOAD"], "count": 1}}));
    let state = store.select(test_box()).unwrap();
    assert_eq!(state.greets, vec!["PRELOAD"]);
    assert_eq!(state.count, 1);
}

#[test]
fn partial_preload_keeps_initial_fields() {
    let store = preloaded_store(json!({"test": {"count": 5}}));
    let state = store.select(test_box()).unwrap();
    assert!(state.greets.is_empty());
    assert_eq!(state.count, 5);
}

#[test]
fn preloaded_keys_are_not_materialized_until_read() {
    let store = preloaded_store(json!({"test": {"count": 5}, "users": ["ada"]}));
    assert!(store.snapshot().is_empty());
    assert_eq!(store.select(user_box()).unwrap(), vec!["ada"]);
    assert_eq!(store.snapshot().keys().collect::<Vec<_>>(), vec!["users"]);
}

#[test]
fn hydration_failure_reaches_the_selecting_caller() {
    let store = preloaded_store(json!({"test": {"count": "many"}}));
    let err = store.select(test_box()).unwrap_err();
    assert!(matches!(err, StoreError::Hydration { ref key, .. } if key == "test"));
    assert!(store.snapshot().is_empty());
}

#[test]
fn selectors_compose_and_materialize_lazily() {
    let store = preloaded_store(json!({"test": {"greets": ["a", "b"], "count": 3}}));
    let greet_count = selector(|store: &Store| Ok(store.select(test_box())?.greets.len()));
    let summary = Selector::labelled("summary", move |store: &Store| {
        let greets = store.select(&greet_count)?;
        let count = store.select(test_box())?.count;
        Ok(format!("{greets} greets, count {count}"))
    });

    assert_eq!(store.select(&summary).unwrap(), "2 greets, count 3");
    assert!(store.snapshot().contains_key("test"));
}

#[test]
fn selectors_are_recomputed_on_every_select() {
    let store = Store::new();
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counted = calls.clone();
    let count = selector(move |store: &Store| {
        counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(store.select(test_box())?.count)
    });
    store.select(&count).unwrap();
    store.select(&count).unwrap();
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn boxes_sharing_a_key_with_different_types_are_rejected() {
    let store = Store::new();
    let numbers = StateBox::new("shared", 0_i64);
    let words = StateBox::new("shared", String::new());
    store.select(&numbers).unwrap();
    let err = store.select(&words).unwrap_err();
    assert!(matches!(err, StoreError::StateType { ref key, .. } if key == "shared"));
}

#[test]
fn stores_do_not_share_state() {
    let a = Store::new();
    let b = Store::new();
    a.dispatch(set_count(7)).unwrap();
    assert_eq!(a.select(test_box()).unwrap().count, 7);
    assert_eq!(b.select(test_box()).unwrap().count, 0);
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[test]
fn mutation_returns_its_args_and_updates_state() {
    let store = preloaded_store(json!({"test": {"greets": ["MUTATION_PRELOAD"], "count": 1}}));
    let patch = GreetsPatch::new(["MUTATION"]);
    let result = store.dispatch(merge_test(patch.clone())).unwrap();
    assert_eq!(result, patch);
    assert_eq!(
        store.select(test_box()).unwrap().greets,
        vec!["MUTATION_PRELOAD", "MUTATION"]
    );
}

#[test]
fn mutation_on_unread_box_materializes_it_first() {
    let store = preloaded_store(json!({"test": {"greets": ["kept"], "count": 1}}));
    store.dispatch(set_count(9)).unwrap();
    let state = store.select(test_box()).unwrap();
    assert_eq!(state.greets, vec!["kept"]);
    assert_eq!(state.count, 9);
}

#[test]
fn mutation_result_can_differ_from_state_written() {
    let store = Store::new();
    let ids = StateBox::new("ids", Vec::<u32>::new());
    let push = ids.mutation(|ids: &Vec<u32>, id: &u32| {
        let mut ids = ids.clone();
        ids.push(*id);
        ids
    });
    let index = store
        .dispatch(push.call(40).with_result("slot-0".to_string()))
        .unwrap();
    assert_eq!(index, "slot-0");
    assert_eq!(store.select(&ids).unwrap(), vec![40]);
}

#[test]
fn merge_state_is_idempotent_and_keeps_other_fields() {
    let store = Store::new();
    let flags = StateBox::new(
        "flags",
        Flags {
            f: 0,
            n: 2,
            name: "kept".into(),
        },
    );
    store.dispatch(flags.merge_state(json!({"f": 1}))).unwrap();
    let once = store.select(&flags).unwrap();
    store.dispatch(flags.merge_state(json!({"f": 1}))).unwrap();
    let twice = store.select(&flags).unwrap();

    assert_eq!(once, twice);
    assert_eq!(
        twice,
        Flags {
            f: 1,
            n: 2,
            name: "kept".into()
        }
    );
}

#[test]
fn update_state_applies_in_order() {
    let store = Store::new();
    let flags = StateBox::new("flags", Flags::default());
    for _ in 0..2 {
        store
            .dispatch(flags.update_state(|s: &Flags| Flags {
                n: s.n + 1,
                ..s.clone()
            }))
            .unwrap();
    }
    assert_eq!(store.select(&flags).unwrap().n, 2);
}

#[test]
fn set_state_replaces_state() {
    let store = Store::new();
    let flags = StateBox::new("flags", Flags::default());
    let next = Flags {
        f: 3,
        n: 4,
        name: "new".into(),
    };
    store.dispatch(flags.set_state(next.clone())).unwrap();
    assert_eq!(store.select(&flags).unwrap(), next);
}

#[test]
fn failed_merge_leaves_state_untouched() {
    let store = Store::new();
    let counter = StateBox::new("counter", 1_i32);
    let err = store.dispatch(counter.merge_state(json!({"f": 1}))).unwrap_err();
    assert!(matches!(err, StoreError::Merge { ref key, .. } if key == "counter"));
    assert_eq!(store.select(&counter).unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Actions and nested dispatch
// ---------------------------------------------------------------------------

#[test]
fn action_result_is_returned_to_caller() {
    let store = Store::new();
    let result = store
        .dispatch(action(|store: &Store| {
            store.dispatch(set_count(4))?;
            Ok(store.select(test_box())?.count * 10)
        }))
        .unwrap();
    assert_eq!(result, 40);
}

#[test]
fn nested_dispatches_settle_into_one_notification() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    store
        .dispatch(action(|store: &Store| {
            store.dispatch(set_count(1))?;
            store.dispatch(user_box().set_state(vec!["ada".into()]))?;
            Ok(())
        }))
        .unwrap();
    assert_eq!(notifications.count(), 1);
    assert_eq!(store.select(test_box()).unwrap().count, 1);
    assert_eq!(store.select(user_box()).unwrap(), vec!["ada"]);
}

#[test]
fn separate_root_dispatches_notify_separately() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    store.dispatch(set_count(1)).unwrap();
    store.dispatch(set_count(2)).unwrap();
    assert_eq!(notifications.take(), 2);

    notifications.stop();
    store.dispatch(set_count(3)).unwrap();
    assert_eq!(notifications.count(), 0);
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[test]
fn batch_notifies_once_after_both_mutations() {
    let store = Store::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let observer = store.clone();
    let log = seen.clone();
    store.subscribe(move || {
        let state = observer.select(test_box()).unwrap();
        let users = observer.select(user_box()).unwrap();
        log.borrow_mut().push((state.count, users));
    });

    let (count, ()) = store
        .dispatch((set_count(2), user_box().set_state(vec!["bob".into()])))
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(*seen.borrow(), vec![(2, vec!["bob".to_string()])]);
}

#[test]
fn vector_batch_returns_results_in_order() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let results = store
        .dispatch(vec![set_count(1), set_count(2), set_count(3)])
        .unwrap();
    assert_eq!(results, vec![1, 2, 3]);
    assert_eq!(store.select(test_box()).unwrap().count, 3);
    assert_eq!(notifications.count(), 1);
}

#[test]
fn empty_batch_is_a_noop_dispatch() {
    let store = Store::new();
    let results = store.dispatch(Vec::<boxstate_core::Mutation<i32>>::new()).unwrap();
    assert!(results.is_empty());
}

// ---------------------------------------------------------------------------
// Failures and re-entrancy
// ---------------------------------------------------------------------------

#[test]
fn actor_error_propagates_unchanged_and_store_stays_usable() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);

    let err = store.dispatch(fail_with("boom")).unwrap_err();
    assert!(matches!(err, StoreError::Anyhow(ref e) if e.to_string() == "boom"));
    assert_eq!(notifications.count(), 0);

    store.dispatch(set_count(1)).unwrap();
    assert_eq!(notifications.count(), 1);
}

#[test]
fn panicking_mutator_does_not_wedge_the_store() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let explode = test_box().update_state(|_: &TestState| panic!("mutator blew up"));

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = store.dispatch(explode);
    }));
    assert!(outcome.is_err());

    store.dispatch(set_count(5)).unwrap();
    assert_eq!(notifications.count(), 1);
    assert_eq!(store.select(test_box()).unwrap().count, 5);
}

#[test]
fn swallowed_nested_failure_still_settles_the_root() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let counter = StateBox::new("counter", 0_i32);
    let checked_add = counter.try_mutation(|n: &i32, by: &i32| {
        n.checked_add(*by)
            .ok_or_else(|| StoreError::from(anyhow::anyhow!("counter overflow")))
    });

    let add = checked_add.clone();
    let failed = store
        .dispatch(action(move |store: &Store| {
            store.dispatch(add.call(i32::MAX))?;
            Ok(store.dispatch(add.call(1)).is_err())
        }))
        .unwrap();
    assert!(failed);
    assert_eq!(notifications.take(), 1);

    // The nested failure left no dispatching flag behind: the next root notifies.
    store.dispatch(checked_add.call(-1)).unwrap();
    assert_eq!(notifications.count(), 1);
    assert_eq!(store.select(&counter).unwrap(), i32::MAX - 1);
}

#[test]
fn propagated_nested_failure_clears_the_root() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);

    let err = store
        .dispatch(action(|store: &Store| {
            store.dispatch(set_count(1))?;
            store.dispatch(fail_with("nested"))?;
            Ok(())
        }))
        .unwrap_err();
    assert!(err.to_string().contains("nested"));
    // Writes made before the failure stay applied.
    assert_eq!(store.select(test_box()).unwrap().count, 1);
    assert_eq!(notifications.count(), 0);

    store.dispatch(set_count(2)).unwrap();
    assert_eq!(notifications.count(), 1);
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[test]
fn unsubscribing_inside_a_listener_is_safe() {
    let store = Store::new();
    let calls = Rc::new(Cell::new(0));
    let handle: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));

    let counted = calls.clone();
    let own = handle.clone();
    *handle.borrow_mut() = Some(store.subscribe(move || {
        counted.set(counted.get() + 1);
        if let Some(off) = own.borrow().as_ref() {
            off.unsubscribe();
        }
    }));
    let others = Notifications::attach(&store);

    store.dispatch(set_count(1)).unwrap();
    store.dispatch(set_count(2)).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(others.count(), 2);
}

#[test]
fn listener_may_dispatch_a_new_root() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let observer = store.clone();
    let fired = Rc::new(Cell::new(false));
    let once = fired.clone();
    store.subscribe(move || {
        if !once.replace(true) {
            observer.dispatch(set_count(100)).unwrap();
        }
    });

    store.dispatch(set_count(1)).unwrap();
    assert_eq!(notifications.count(), 2);
    assert_eq!(store.select(test_box()).unwrap().count, 100);
}

#[test]
fn batch_scope_notifies_once() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let count = store
        .batch(|store: &Store| {
            store.dispatch(set_count(1))?;
            store.dispatch(set_count(2))?;
            Ok(store.select(test_box())?.count)
        })
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(notifications.count(), 1);
}

#[test]
fn failed_batch_scope_does_not_notify() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    let err = store
        .batch(|store: &Store| {
            store.dispatch(set_count(1))?;
            store.dispatch(fail_with("scope failed"))
        })
        .unwrap_err();
    assert!(err.to_string().contains("scope failed"));
    assert_eq!(notifications.count(), 0);
    assert_eq!(store.select(test_box()).unwrap().count, 1);
}

#[test]
fn deferred_notifications_coalesce_until_flush() {
    let store = create_store(StoreOptions::new().with_defer_notify(true), Vec::new());
    let notifications = Notifications::attach(&store);

    store.dispatch(set_count(1)).unwrap();
    store.dispatch(set_count(2)).unwrap();
    assert_eq!(notifications.count(), 0);
    assert_eq!(store.select(test_box()).unwrap().count, 2);

    assert!(store.flush());
    assert_eq!(notifications.count(), 1);
    assert!(!store.flush());
    assert_eq!(notifications.count(), 1);
}

#[test]
fn deferral_skips_failed_dispatches() {
    let store = create_store(StoreOptions::new().with_defer_notify(true), Vec::new());
    let notifications = Notifications::attach(&store);
    assert!(store.dispatch(fail_with("nothing settled")).is_err());
    assert!(!store.flush());
    assert_eq!(notifications.count(), 0);
}

#[test]
fn flush_without_deferral_has_nothing_to_deliver() {
    let store = Store::new();
    let notifications = Notifications::attach(&store);
    store.dispatch(set_count(1)).unwrap();
    assert_eq!(notifications.count(), 1);
    assert!(!store.flush());
    assert_eq!(notifications.count(), 1);
}

// ---------------------------------------------------------------------------
// Snapshot round trip
// ---------------------------------------------------------------------------

#[test]
fn snapshot_rehydrates_another_store() {
    let source = Store::new();
    source
        .dispatch((
            merge_test(GreetsPatch::new(["hello"])),
            user_box().set_state(vec!["ada".into()]),
        ))
        .unwrap();

    let dehydrated = source.snapshot().to_json().unwrap();
    let target = create_store(
        StoreOptions::new().with_preloaded_state(dehydrated),
        Vec::new(),
    );
    assert_eq!(target.select(test_box()).unwrap(), source.select(test_box()).unwrap());
    assert_eq!(target.select(user_box()).unwrap(), vec!["ada"]);
}

#[test]
fn preloaded_helper_ignores_non_objects() {
    assert!(preloaded(json!([1, 2])).is_empty());
}
