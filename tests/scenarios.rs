mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{init_tracing, present, settle, Recorder};
use eventual_send::prelude::*;
use eventual_send::{forest, PostponedHandler};

#[test]
fn get_on_presence_reaches_its_handler() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET).prop("x", 42));
    let (_promise, presence) = present(handler.clone());

    let answer = HandledPromise::get(presence, "x");

    assert_eq!(settle(answer).unwrap(), Value::Int(42));
    assert_eq!(handler.calls(), ["get x"]);
}

#[test]
fn apply_function_follows_chain_to_presence() {
    init_tracing();
    let (a, resolve_a) = HandledPromise::with_resolvers(None);
    let (b, resolve_b) = HandledPromise::with_resolvers(None);
    resolve_a.resolve(b.clone()).unwrap();
    let handler = Rc::new(Recorder::new(Operations::APPLY_FUNCTION).reply("ok"));
    resolve_b
        .resolve_with_presence(handler.clone(), PresenceOptions::default())
        .unwrap();

    let answer = HandledPromise::apply_function(a.clone(), vec![]);

    assert_eq!(settle(answer).unwrap(), Value::from("ok"));
    assert_eq!(handler.calls(), ["applyFunction/0"]);
}

#[test]
fn postponed_gets_replay_against_plain_object() {
    init_tracing();
    let (a, resolve_a) = HandledPromise::with_resolvers(None);
    let first = HandledPromise::get(a.clone(), "a");
    let second = HandledPromise::get(a.clone(), "b");
    turn::run_until_idle();
    assert!(first.is_pending());
    assert!(second.is_pending());

    resolve_a
        .resolve(Object::new().with("a", 1).with("b", 2))
        .unwrap();

    assert_eq!(settle(first).unwrap(), Value::Int(1));
    assert_eq!(settle(second).unwrap(), Value::Int(2));
}

#[test]
fn sends_to_local_values_complete() {
    init_tracing();
    let counter = Rc::new(Cell::new(0));
    let seen = counter.clone();
    let obj = Object::new().method("bump", move |_, args| {
        let by = args.first().and_then(Value::as_int).unwrap_or(1);
        seen.set(seen.get() + by);
        Ok(Value::Int(seen.get()))
    });

    let answer = E::new(obj.clone()).call("bump", [Value::Int(5)]);
    assert_eq!(counter.get(), 0, "sends never run inline");
    assert_eq!(settle(answer).unwrap(), Value::Int(5));

    let list = Value::list([Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(settle(E::new(list).get("length")).unwrap(), Value::Int(3));
}

#[test]
fn custom_pending_handler_services_pipelined_sends() {
    init_tracing();
    let pending = Rc::new(Recorder::new(Operations::GET).prop("k", 7));
    let handler: Rc<dyn Handler> = pending.clone();
    let (never, _keep) = HandledPromise::with_resolvers(Some(handler));

    let answer = HandledPromise::get(never.clone(), "k");

    assert_eq!(settle(answer).unwrap(), Value::Int(7));
    assert_eq!(pending.calls(), ["get k"]);
    assert!(never.is_pending());
    assert!(forest::has_pending_handler(&never));
}

#[test]
fn sends_chain_off_unresolved_answers() {
    init_tracing();
    let (root, resolve_root) = HandledPromise::with_resolvers(None);
    let inner = Object::new().with("leaf", "found");
    let outer = Object::new().with("inner", inner);

    let step = HandledPromise::get(root.clone(), "inner");
    let leaf = HandledPromise::get(step, "leaf");
    turn::run_until_idle();
    assert!(leaf.is_pending());

    resolve_root.resolve(outer).unwrap();
    assert_eq!(settle(leaf).unwrap(), Value::from("found"));
}

#[test]
fn postponed_handler_replays_late_arrivals_after_forwarding_begins() {
    init_tracing();
    let postponed = Rc::new(PostponedHandler::new());
    let target = Value::from(Object::new().with("x", 3));
    postponed.continue_forwarding(target.clone());

    let answer = postponed.get(&target, &PropertyKey::from("x"), None).unwrap();
    let answer = HandledPromise::resolve(answer);
    assert_eq!(postponed.buffered(), 1);
    assert_eq!(settle(answer).unwrap(), Value::Int(3));
    assert_eq!(postponed.buffered(), 0);
}
