//! Integration tests for Simplux

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use simplux::store::combine_reducers;
use simplux::testing::mock_mutation;
use simplux::{
    Action, Capabilities, Config, Error, ModuleConfig, ModuleCore, MutationDefinitions, Registry,
    Store,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Todos {
    items: Vec<String>,
    done: usize,
}

fn development() -> Registry {
    Registry::with_config(Config::development())
}

fn production() -> Registry {
    Registry::with_config(Config::production())
}

fn host_store(registry: &Registry) -> Store<Value> {
    Store::new(combine_reducers([
        ("simplux", registry.root_reducer()),
        (
            "host",
            Arc::new(|state: Option<&Value>, action: &Action| -> simplux::Result<Value> {
                let count = state.and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(if action.kind == "HOST" { count + 1 } else { count }))
            }) as simplux::Reducer<Value>,
        ),
    ]))
    .unwrap()
}

fn simplux_slice(state: &Value) -> Value {
    state["simplux"].clone()
}

#[test]
fn new_module_reports_initial_state() {
    let registry = development();

    let number = registry.create_module(ModuleConfig::new("number", 42_i32)).unwrap();
    let text = registry
        .create_module(ModuleConfig::new("text", "hello".to_string()))
        .unwrap();
    let todos = registry
        .create_module(ModuleConfig::new(
            "todos",
            Todos {
                items: vec!["write tests".into()],
                done: 0,
            },
        ))
        .unwrap();

    assert_eq!(number.get_state().unwrap(), 42);
    assert_eq!(text.get_state().unwrap(), "hello");
    assert_eq!(todos.get_state().unwrap(), *todos.initial_state());
}

#[test]
fn call_matches_with_state_on_prior_state() {
    let registry = development();
    let todos = registry
        .create_module(ModuleConfig::new("todos", Todos::default()))
        .unwrap();
    let mutations = todos
        .create_mutations(
            MutationDefinitions::new()
                .define("add", |state: &mut Todos, (item,): (String,)| {
                    state.items.push(item)
                })
                .define("complete", |state: &mut Todos, (): ()| state.done += 1),
        )
        .unwrap();
    let add = mutations.get::<(String,)>("add").unwrap();
    let complete = mutations.get::<()>("complete").unwrap();

    add.call(("one".into(),)).unwrap();
    let prior = todos.get_state().unwrap();
    let expected = add.with_state(prior)(("two".into(),)).unwrap();

    add.call(("two".into(),)).unwrap();
    assert_eq!(todos.get_state().unwrap(), expected);

    let prior = todos.get_state().unwrap();
    let expected = complete.with_state(prior)(()).unwrap();
    assert_eq!(complete.call(()).unwrap(), expected);
}

#[test]
fn action_creator_round_trips_through_reducer() {
    let registry = development();
    let todos = registry
        .create_module(ModuleConfig::new("todos", Todos::default()))
        .unwrap();
    let add = todos
        .create_mutation("add", |state: &mut Todos, (item,): (String,)| {
            state.items.push(item)
        })
        .unwrap();

    let action = add.as_action_creator(("milk".into(),)).unwrap();
    let wire = serde_json::to_value(&action).unwrap();
    assert_eq!(
        wire,
        json!({
            "type": "@simplux/todos/mutation/add",
            "mutationName": "add",
            "args": ["milk"],
        })
    );

    let start = serde_json::to_value(todos.get_state().unwrap()).unwrap();
    let replayed: Action = serde_json::from_value(wire).unwrap();
    let reduced = todos.internals().reducer()(Some(&start), &replayed).unwrap();

    let called = add.call(("milk".into(),)).unwrap();
    assert_eq!(reduced, serde_json::to_value(called).unwrap());
}

#[test]
fn event_argument_behaves_like_no_argument() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let increment = counter
        .create_mutation("increment", |state: &mut i64, (): ()| *state += 1)
        .unwrap();

    let event = json!({
        "type": "click",
        "target": { "id": "button" },
        "currentTarget": { "id": "button" },
        "defaultPrevented": false,
    });

    let with_event = increment.call_with_values(vec![event]).unwrap();
    let after_event = counter.get_state().unwrap();
    counter.set_state(0).unwrap();
    let without = increment.call(()).unwrap();

    assert_eq!(with_event, without);
    assert_eq!(after_event, counter.get_state().unwrap());
}

#[test]
fn nested_dispatch_is_rejected_but_with_state_is_not() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let other = registry.create_module(ModuleConfig::new("other", 0_i64)).unwrap();

    let increment = other
        .create_mutation("increment", |state: &mut i64, (): ()| *state += 1)
        .unwrap();

    let error = Arc::new(Mutex::new(None));
    let dispatching = {
        let increment = increment.clone();
        let error = error.clone();
        counter
            .create_mutation("dispatching", move |_: &mut i64, (): ()| {
                if let Err(err) = increment.call(()) {
                    *error.lock().unwrap() = Some(err.to_string());
                }
            })
            .unwrap()
    };
    let pure = {
        let increment = increment.clone();
        counter
            .create_mutation("pure", move |state: &mut i64, (): ()| {
                increment.with_state(*state)(()).ok()
            })
            .unwrap()
    };

    dispatching.call(()).unwrap();
    let message = error.lock().unwrap().take().expect("nested call should fail");
    assert!(message.contains("'increment'"));
    assert!(message.contains("'dispatching'"));
    assert_eq!(other.get_state().unwrap(), 0);

    assert_eq!(pure.call(()).unwrap(), 1);
    assert_eq!(other.get_state().unwrap(), 0);
}

#[test]
fn cleanup_twice_is_harmless() {
    let registry = development();
    let store = host_store(&registry);
    let cleanup = registry.set_store(store, simplux_slice);

    cleanup.cleanup().unwrap();
    cleanup.cleanup().unwrap();
    assert!(!registry.has_store());
    assert!(matches!(registry.get_state(), Err(Error::StoreNotInitialized)));
}

#[test]
fn configuration_transfers_across_store_swap() {
    let registry = development();
    let module = registry
        .create_module(ModuleConfig::new("test", json!({ "prop": "value" })))
        .unwrap();

    let host = host_store(&registry);
    let _cleanup = registry.set_store(host.clone(), simplux_slice);

    assert_eq!(host.state()["simplux"]["test"], json!({ "prop": "value" }));
    assert_eq!(module.get_state().unwrap(), json!({ "prop": "value" }));

    module.set_state(json!({ "prop": "changed" })).unwrap();
    assert_eq!(host.state()["simplux"]["test"], json!({ "prop": "changed" }));
}

#[test]
fn stale_cleanup_fails_in_development() {
    let registry = development();
    let first = registry.set_store(host_store(&registry), simplux_slice);
    let _second = registry.set_store(host_store(&registry), simplux_slice);

    let err = first.cleanup().unwrap_err();
    assert!(err.to_string().contains("cannot cleanup store"));
    assert!(registry.has_store());
}

#[test]
fn stale_cleanup_is_ignored_in_production() {
    let registry = production();
    let first = registry.set_store(host_store(&registry), simplux_slice);
    let second = registry.set_store(host_store(&registry), simplux_slice);

    first.cleanup().unwrap();
    assert!(registry.has_store());
    assert_eq!(registry.active_proxy().unwrap().generation(), second.generation());
}

#[test]
fn host_actions_pass_through_module_reducers() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let increment = counter
        .create_mutation("increment", |state: &mut i64, (): ()| *state += 1)
        .unwrap();

    let host = host_store(&registry);
    let _cleanup = registry.set_store(host.clone(), simplux_slice);

    host.dispatch(Action::new("HOST")).unwrap();
    increment.call(()).unwrap();
    host.dispatch(Action::new("HOST")).unwrap();

    assert_eq!(host.state(), json!({ "simplux": { "counter": 1 }, "host": 2 }));
}

#[test]
fn module_subscriptions_follow_store_swaps() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let seen = seen.clone();
        counter.subscribe_to_state_changes(move |state| seen.lock().unwrap().push(*state))
    };

    counter.set_state(1).unwrap();
    let _cleanup = registry.set_store(host_store(&registry), simplux_slice);
    counter.set_state(5).unwrap();

    // The swap itself resets the slice to its initial state.
    assert_eq!(*seen.lock().unwrap(), vec![1, 0, 5]);
    subscription.unsubscribe();
    subscription.unsubscribe();
}

#[test]
fn replayed_action_for_unknown_mutation() {
    let strict = development();
    let module = strict.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let replay = Action::mutation("counter", "removed", vec![]);
    assert!(matches!(
        strict.dispatch(replay.clone()),
        Err(Error::MissingMutation { .. })
    ));
    assert_eq!(module.get_state().unwrap(), 0);

    let lenient = production();
    let module = lenient.create_module(ModuleConfig::new("counter", 3_i64)).unwrap();
    lenient.dispatch(replay).unwrap();
    assert_eq!(module.get_state().unwrap(), 3);
}

#[test]
fn extensions_and_mocks_work_together() {
    struct Describe(String);

    let registry = development();
    let calls = Arc::new(AtomicUsize::new(0));
    let handle = {
        let calls = calls.clone();
        registry.register_extension(move |core: &ModuleCore, _: &ModuleConfig<Value>| {
            calls.fetch_add(1, Ordering::SeqCst);
            Capabilities::new().with(Describe(format!("module {}", core.name())))
        })
    };

    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    handle.unregister();
    handle.unregister();
    let plain = registry.create_module(ModuleConfig::new("plain", 0_i64)).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(counter.capability::<Describe>().unwrap().0, "module counter");
    assert!(plain.capability::<Describe>().is_none());

    let increment = counter
        .create_mutation("increment", |state: &mut i64, (): ()| *state += 1)
        .unwrap();
    {
        let _mock = mock_mutation(&increment, |()| 100);
        assert_eq!(increment.call(()).unwrap(), 100);
        assert_eq!(counter.get_state().unwrap(), 0);
    }
    assert_eq!(increment.call(()).unwrap(), 1);
}

#[test]
fn modules_serve_sequential_request_stores() {
    let registry = Registry::with_config(Config::development().without_default_store());
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let increment = counter
        .create_mutation("increment", |state: &mut i64, (): ()| *state += 1)
        .unwrap();

    for _ in 0..2 {
        let host = host_store(&registry);
        let cleanup = registry.set_store(host.clone(), simplux_slice);

        assert_eq!(increment.call(()).unwrap(), 1);
        assert_eq!(host.state()["simplux"]["counter"], 1);

        cleanup.cleanup().unwrap();
        assert!(!registry.has_store());
        assert!(matches!(increment.call(()), Err(Error::StoreNotInitialized)));
    }
}

#[test]
fn failing_body_propagates_nested_dispatch() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let inner = counter
        .create_mutation("inner", |state: &mut i64, (): ()| *state += 10)
        .unwrap();
    let outer = counter
        .create_mutation("outer", move |state: &mut i64, (): ()| -> simplux::Result<()> {
            *state += 1;
            inner.call(())?;
            Ok(())
        })
        .unwrap();

    assert!(matches!(
        outer.call(()),
        Err(Error::NestedDispatch { ref mutation, ref in_flight })
            if mutation == "inner" && in_flight == "outer"
    ));
    assert_eq!(counter.get_state().unwrap(), 0);
}

#[test]
fn falsy_leading_value_is_dropped_for_untyped_calls() {
    let registry = development();
    let counter = registry.create_module(ModuleConfig::new("counter", 0_i64)).unwrap();
    let add = counter
        .create_mutation("add", |state: &mut i64, (by,): (i64,)| *state += by)
        .unwrap();

    assert_eq!(add.call_with_values(vec![json!(false), json!(5)]).unwrap(), 5);
}
