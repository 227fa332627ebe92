//! End-to-end behavior of bound properties against the reference store.
//!
//! Covers:
//! 1. Memoization per store version and recomputation on version change.
//! 2. Default selector equivalence with the literal property-name path.
//! 3. Handler name resolution and push notification wiring.
//! 4. Silent skip on non-configurable properties.
//! 5. Stale-value-on-failure at an unchanged version.
//! 6. Per-instance cache isolation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use memsel_core::{
    HandlerError, Installation, Owner, PropertyError, Schema, Select, SelectConfig, bind_all,
};
use memsel_store::{PathSegment, SelectError, Selector, Store, VersionedStore};
use serde_json::{Value, json};

// ── Helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("memsel_core=trace,memsel_store=trace")
        .with_test_writer()
        .try_init();
}

/// Function selector over `key` that counts its evaluations.
fn counted(key: &'static str) -> (Selector, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let selector = Selector::map(move |s| {
        counter.set(counter.get() + 1);
        s[key].clone()
    });
    (selector, calls)
}

/// Record every call of handler `name` on `owner`.
fn record(owner: &Owner, name: &str) -> Rc<RefCell<Vec<Vec<Value>>>> {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    owner.on(name, move |args| {
        sink.borrow_mut().push(args.to_vec());
        Ok(())
    });
    calls
}

// ═════════════════════════════════════════════════════════════════════════
// Memoization
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn count_scenario() {
    init_tracing();
    let store = Store::new(json!({"count": 5}));
    let owner = Rc::new(Owner::new().with("count", json!(null)));
    let binding = Select::auto().bind(&store, &owner, "count");
    let accessor = binding.accessor.clone().unwrap();

    assert_eq!(store.version(), 1);
    assert_eq!(owner.get("count").unwrap(), json!(5));
    assert_eq!(accessor.computations(), 1);

    store.replace(json!({"count": 6})).unwrap();
    assert_eq!(store.version(), 2);
    assert_eq!(owner.get("count").unwrap(), json!(6));
    assert_eq!(accessor.computations(), 2);

    assert_eq!(owner.get("count").unwrap(), json!(6));
    assert_eq!(accessor.computations(), 2);
}

#[test]
fn reads_at_fixed_version_select_once() {
    let store = Store::new(json!({"total": 10}));
    let owner = Rc::new(Owner::new());
    let (selector, calls) = counted("total");
    let _ = Select::from_selector(selector).bind(&store, &owner, "total");

    for _ in 0..25 {
        assert_eq!(owner.get("total").unwrap(), json!(10));
    }
    assert_eq!(calls.get(), 1);
}

#[test]
fn each_version_recomputes_once() {
    let store = Store::new(json!({"n": 0}));
    let owner = Rc::new(Owner::new());
    let (selector, calls) = counted("n");
    let _ = Select::from_selector(selector).bind(&store, &owner, "n");

    for i in 1..=5 {
        store.update(|s| s["n"] = json!(i)).unwrap();
        assert_eq!(owner.get("n").unwrap(), json!(i));
        assert_eq!(owner.get("n").unwrap(), json!(i));
    }
    assert_eq!(calls.get(), 5);
}

#[test]
fn no_select_until_first_read() {
    let store = Store::new(json!({"n": 1}));
    let owner = Rc::new(Owner::new());
    let (selector, calls) = counted("n");
    let _ = Select::from_selector(selector).bind(&store, &owner, "n");

    store.update(|s| s["n"] = json!(2)).unwrap();
    store.update(|s| s["n"] = json!(3)).unwrap();
    assert_eq!(calls.get(), 0);
    assert_eq!(owner.get("n").unwrap(), json!(3));
    assert_eq!(calls.get(), 1);
}

// ═════════════════════════════════════════════════════════════════════════
// Selectors
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn default_selector_matches_literal_path() {
    let store = Store::new(json!({"foo": {"deep": [1, 2]}}));
    let owner = Rc::new(Owner::new());
    let _ = Select::auto().bind(&store, &owner, "foo");
    let _ = Select::from_selector("foo").bind(&store, &owner, "literal");
    assert_eq!(owner.get("foo").unwrap(), owner.get("literal").unwrap());

    store.update(|s| s["foo"]["deep"][0] = json!(9)).unwrap();
    assert_eq!(owner.get("foo").unwrap(), json!({"deep": [9, 2]}));
    assert_eq!(owner.get("foo").unwrap(), owner.get("literal").unwrap());
}

#[test]
fn path_and_sequence_selectors() {
    let store = Store::new(json!({"todos": [{"title": "a"}, {"title": "b"}]}));
    let owner = Rc::new(Owner::new());
    let _ = Select::from_selector("todos[1].title").bind(&store, &owner, "second");
    let _ = Select::from_selector(Selector::segments([
        PathSegment::key("todos"),
        PathSegment::Index(0),
        PathSegment::key("title"),
    ]))
    .bind(&store, &owner, "first");
    let _ = Select::from_selector("todos[5].title").bind(&store, &owner, "missing");

    assert_eq!(owner.get("second").unwrap(), json!("b"));
    assert_eq!(owner.get("first").unwrap(), json!("a"));
    assert_eq!(owner.get("missing").unwrap(), Value::Null);
}

#[test]
fn malformed_path_fails_on_read_not_bind() {
    let store = Store::default();
    let owner = Rc::new(Owner::new());
    let binding = Select::from_selector("a..b").bind(&store, &owner, "x");
    assert!(binding.is_installed());
    assert!(matches!(
        owner.get("x"),
        Err(PropertyError::Select {
            source: SelectError::MalformedPath { .. },
            ..
        })
    ));
}

#[test]
fn typed_read_through_accessor() {
    let store = Store::new(json!({"items": [1, 2, 3]}));
    let owner = Rc::new(Owner::new());
    let _ = Select::auto().bind(&store, &owner, "items");
    let items: Vec<u32> = owner.get_as("items").unwrap();
    assert_eq!(items, vec![1, 2, 3]);
}

// ═════════════════════════════════════════════════════════════════════════
// Installation
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn installed_property_is_read_only() {
    let store = Store::new(json!({"count": 1}));
    let owner = Rc::new(Owner::new().with("count", json!(0)));
    let _ = Select::auto().bind(&store, &owner, "count");

    assert!(matches!(
        owner.set("count", json!(99)),
        Err(PropertyError::ReadOnly { .. })
    ));
    assert_eq!(owner.get("count").unwrap(), json!(1));
    assert!(owner.descriptor("count").unwrap().store_derived);
}

#[test]
fn non_configurable_property_is_skipped_silently() {
    let store = Store::new(json!({"id": "from-store"}));
    let owner = Rc::new(Owner::new().with_frozen("id", json!("original")));
    let binding = Select::auto().bind(&store, &owner, "id");

    assert_eq!(binding.installation, Installation::Skipped);
    assert!(binding.accessor.is_none());
    assert_eq!(owner.get("id").unwrap(), json!("original"));
    assert!(!owner.descriptor("id").unwrap().store_derived);
}

#[test]
fn skipped_property_is_still_observed() {
    let store = Store::new(json!({"id": "from-store"}));
    let owner = Rc::new(Owner::new().with_frozen("id", json!("original")));
    let calls = record(&owner, "idChanged");

    let binding = Select::auto()
        .with_config(SelectConfig::subscribed())
        .bind(&store, &owner, "id");
    assert_eq!(binding.installation, Installation::Skipped);
    assert_eq!(store.pending_tasks(), 1);

    store.flush();
    assert_eq!(store.pending_tasks(), 0);
    assert_eq!(store.observer_count(), 1);

    // The frozen value never changes, so its handler never fires.
    store.update(|s| s["id"] = json!("changed")).unwrap();
    assert!(calls.borrow().is_empty());
    assert_eq!(owner.get("id").unwrap(), json!("original"));
}

#[test]
fn empty_segment_selector_is_kept() {
    let store = Store::new(json!({"items": [1, 2]}));
    let owner = Rc::new(Owner::new());
    let _ = Select::from_selector(Selector::segments(Vec::<PathSegment>::new()))
        .bind(&store, &owner, "items");
    assert_eq!(owner.get("items").unwrap(), Value::Null);
}

#[test]
#[should_panic]
fn reading_bound_property_inside_update_panics() {
    let store = Store::new(json!({"n": 1}));
    let owner = Rc::new(Owner::new());
    let _ = Select::auto().bind(&store, &owner, "n");
    let reader = Rc::clone(&owner);
    let _ = store.update(move |s| {
        let _ = reader.get("n");
        s["n"] = json!(2);
    });
}

#[test]
fn rebinding_replaces_accessor() {
    let store = Store::new(json!({"a": 1, "b": 2}));
    let owner = Rc::new(Owner::new());
    let _ = Select::from_selector("a").bind(&store, &owner, "v");
    assert_eq!(owner.get("v").unwrap(), json!(1));
    let _ = Select::from_selector("b").bind(&store, &owner, "v");
    assert_eq!(owner.get("v").unwrap(), json!(2));
}

// ═════════════════════════════════════════════════════════════════════════
// Failure isolation
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn failure_at_version_serves_last_good_value() {
    let store = Store::new(json!({"n": 1}));
    let owner = Rc::new(Owner::new());
    let attempts = Rc::new(Cell::new(0));
    let counter = Rc::clone(&attempts);
    let selector = Selector::func(move |s| {
        counter.set(counter.get() + 1);
        match s["n"].as_i64() {
            Some(n) if n >= 0 => Ok(json!(n)),
            _ => Err(SelectError::selector("negative")),
        }
    });
    let _ = Select::from_selector(selector).bind(&store, &owner, "n");

    assert_eq!(owner.get("n").unwrap(), json!(1));
    store.update(|s| s["n"] = json!(-1)).unwrap();

    let err = owner.get("n").unwrap_err();
    assert!(err.to_string().contains("negative"));
    assert_eq!(attempts.get(), 2);

    // Same version: stale value, no retry, no error.
    assert_eq!(owner.get("n").unwrap(), json!(1));
    assert_eq!(owner.get("n").unwrap(), json!(1));
    assert_eq!(attempts.get(), 2);

    store.update(|s| s["n"] = json!(4)).unwrap();
    assert_eq!(owner.get("n").unwrap(), json!(4));
    assert_eq!(attempts.get(), 3);
}

// ═════════════════════════════════════════════════════════════════════════
// Observer wiring
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn default_handler_notified_on_change() {
    init_tracing();
    let store = Store::new(json!({"bar": 1, "other": 0}));
    let owner = Rc::new(Owner::new());
    let calls = record(&owner, "barChanged");

    let binding = Select::auto()
        .with_config(SelectConfig::subscribed())
        .bind(&store, &owner, "bar");
    assert_eq!(binding.handler_name, "barChanged");
    store.flush();

    store.update(|s| s["other"] = json!(1)).unwrap();
    assert!(calls.borrow().is_empty());

    store.update(|s| s["bar"] = json!(2)).unwrap();
    assert_eq!(*calls.borrow(), vec![vec![json!(2), json!(1)]]);
}

#[test]
fn explicit_handler_name() {
    let store = Store::new(json!({"bar": 1}));
    let owner = Rc::new(Owner::new());
    let custom = record(&owner, "customHandler");
    let default = record(&owner, "barChanged");

    let binding = Select::auto()
        .with_config(SelectConfig::handler("customHandler"))
        .bind(&store, &owner, "bar");
    assert_eq!(binding.handler_name, "customHandler");
    store.flush();

    store.update(|s| s["bar"] = json!(3)).unwrap();
    assert_eq!(custom.borrow().len(), 1);
    assert!(default.borrow().is_empty());
}

#[test]
fn no_subscription_registers_nothing() {
    let store = Store::new(json!({"bar": 1}));
    let owner = Rc::new(Owner::new());
    let calls = record(&owner, "barChanged");

    let _ = Select::auto()
        .with_config(SelectConfig::from_json(r#"{"subscribe": false}"#).unwrap())
        .bind(&store, &owner, "bar");
    store.flush();
    assert_eq!(store.observer_count(), 0);

    store.update(|s| s["bar"] = json!(2)).unwrap();
    assert!(calls.borrow().is_empty());
}

#[test]
fn registration_observes_installed_accessor() {
    let store = Store::new(json!({"count": 5}));
    // The plain value differs from the store; registering against it would
    // make the first commit look like a change.
    let owner = Rc::new(Owner::new().with("count", json!(0)));
    let calls = record(&owner, "countChanged");

    let _ = bind_all(
        &store,
        &owner,
        &[("count", Select::auto().with_config(SelectConfig::subscribed()))],
    );
    store.update(|_| {}).unwrap();
    assert!(calls.borrow().is_empty());
}

#[test]
fn handler_is_resolved_at_notification_time() {
    let store = Store::new(json!({"x": 0}));
    let owner = Rc::new(Owner::new());
    let first = record(&owner, "xChanged");
    let _ = bind_all(
        &store,
        &owner,
        &[("x", Select::auto().with_config(SelectConfig::subscribed()))],
    );

    store.update(|s| s["x"] = json!(1)).unwrap();
    let second = record(&owner, "xChanged");
    store.update(|s| s["x"] = json!(2)).unwrap();

    assert_eq!(first.borrow().len(), 1);
    assert_eq!(second.borrow().len(), 1);
}

#[test]
fn missing_handler_surfaces_through_dispatch() {
    let store = Store::new(json!({"x": 0}));
    let owner = Rc::new(Owner::new());
    let _ = bind_all(
        &store,
        &owner,
        &[("x", Select::auto().with_config(SelectConfig::subscribed()))],
    );

    let err = store.update(|s| s["x"] = json!(1)).unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].key, "x");
    assert!(err.failures[0].message.contains("xChanged"));
}

#[test]
fn failing_handler_surfaces_through_dispatch() {
    let store = Store::new(json!({"x": 0}));
    let owner = Rc::new(Owner::new());
    owner.on("xChanged", |_| Err(HandlerError::new("rejected")));
    let _ = bind_all(
        &store,
        &owner,
        &[("x", Select::auto().with_config(SelectConfig::subscribed()))],
    );

    let err = store.update(|s| s["x"] = json!(1)).unwrap_err();
    assert!(err.failures[0].message.contains("rejected"));
}

#[test]
fn dropped_owner_stops_notifications() {
    let store = Store::new(json!({"x": 0}));
    let owner = Rc::new(Owner::new());
    let calls = record(&owner, "xChanged");
    let _ = bind_all(
        &store,
        &owner,
        &[("x", Select::auto().with_config(SelectConfig::subscribed()))],
    );
    assert_eq!(store.observer_count(), 1);

    drop(owner);
    store.update(|s| s["x"] = json!(1)).unwrap();
    assert!(calls.borrow().is_empty());
    assert_eq!(store.observer_count(), 0);
}

#[test]
fn handler_may_read_bound_properties() {
    let store = Store::new(json!({"a": 1, "b": 10}));
    let owner = Rc::new(Owner::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let weak = Rc::downgrade(&owner);
    owner.on("aChanged", move |_| {
        let owner = weak
            .upgrade()
            .ok_or_else(|| HandlerError::new("owner gone"))?;
        let b = owner
            .get("b")
            .map_err(|e| HandlerError::new(e.to_string()))?;
        sink.borrow_mut().push(b);
        Ok(())
    });
    let _ = bind_all(
        &store,
        &owner,
        &[
            ("a", Select::auto().with_config(SelectConfig::subscribed())),
            ("b", Select::auto()),
        ],
    );

    store
        .update(|s| {
            s["a"] = json!(2);
            s["b"] = json!(20);
        })
        .unwrap();
    assert_eq!(*seen.borrow(), vec![json!(20)]);
}

// ═════════════════════════════════════════════════════════════════════════
// Per-instance isolation
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn instances_from_one_schema_do_not_share_cache() {
    let store = Store::new(json!({"n": 1}));
    let (selector, calls) = counted("n");
    let schema = Schema::new().field("n", Select::from_selector(selector));

    let a = Rc::new(Owner::new());
    let b = Rc::new(Owner::new());
    let bindings_a = schema.apply(&store, &a);
    let bindings_b = schema.apply(&store, &b);

    assert_eq!(a.get("n").unwrap(), json!(1));
    assert_eq!(b.get("n").unwrap(), json!(1));
    // Each instance computed its own value.
    assert_eq!(calls.get(), 2);
    assert_eq!(bindings_a[0].accessor.as_ref().unwrap().computations(), 1);
    assert_eq!(bindings_b[0].accessor.as_ref().unwrap().computations(), 1);
    assert!(!Rc::ptr_eq(
        bindings_a[0].accessor.as_ref().unwrap(),
        bindings_b[0].accessor.as_ref().unwrap()
    ));
}
