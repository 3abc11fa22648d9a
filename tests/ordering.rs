mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{init_tracing, settle, Recorder};
use eventual_send::prelude::*;

#[test]
fn postponed_operations_keep_their_order() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::all()).reply("r"));
    let (target, resolvers) = HandledPromise::with_resolvers(None);

    let first = HandledPromise::get(target.clone(), "a");
    turn::run_until_idle();
    let second = HandledPromise::apply_method(target.clone(), "b", [Value::Int(1)]);
    HandledPromise::get_send_only(target.clone(), "c");
    turn::run_until_idle();
    let third = HandledPromise::apply_function(target.clone(), vec![]);
    turn::run_until_idle();

    // Resolve two turns from now.
    let bound: Rc<dyn Handler> = handler.clone();
    turn::enqueue(move || {
        turn::enqueue(move || {
            resolvers
                .resolve_with_presence(bound, PresenceOptions::default())
                .unwrap();
        });
    });
    turn::run_until_idle();

    assert_eq!(
        handler.calls(),
        ["get a", "applyMethod b/1", "getSendOnly c", "applyFunction/0"]
    );
    assert_eq!(settle(first).unwrap(), Value::Undefined);
    assert_eq!(settle(second).unwrap(), Value::from("r"));
    assert_eq!(settle(third).unwrap(), Value::from("r"));
}

#[test]
fn sends_racing_settlement_queue_behind_buffered_ones() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET));
    let (target, resolvers) = HandledPromise::with_resolvers(None);

    HandledPromise::get_send_only(target.clone(), "a");
    turn::run_until_idle();
    // Not yet seen by the pending handler when the promise settles.
    HandledPromise::get_send_only(target.clone(), "b");
    resolvers
        .resolve_with_presence(handler.clone(), PresenceOptions::default())
        .unwrap();
    turn::run_until_idle();

    assert_eq!(handler.calls(), ["get a", "get b"]);
}

#[test]
fn sends_racing_a_local_resolution_keep_their_order() {
    init_tracing();
    let order = Rc::new(RefCell::new(Vec::new()));
    let (log_a, log_b) = (order.clone(), order.clone());
    let object = Object::new()
        .method("a", move |_, _| {
            log_a.borrow_mut().push("a");
            Ok(Value::Undefined)
        })
        .method("b", move |_, _| {
            log_b.borrow_mut().push("b");
            Ok(Value::Undefined)
        });
    let (target, resolvers) = HandledPromise::with_resolvers(None);

    let first = E::new(target.clone()).call("a", vec![]);
    turn::run_until_idle();
    let second = E::new(target.clone()).call("b", vec![]);
    resolvers.resolve(object).unwrap();

    assert_eq!(settle(second).unwrap(), Value::Undefined);
    assert_eq!(settle(first).unwrap(), Value::Undefined);
    assert_eq!(*order.borrow(), ["a", "b"]);
}

#[test]
fn replay_through_a_pending_promise_keeps_its_order() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET));
    let (target, resolvers) = HandledPromise::with_resolvers(None);
    let (next, next_resolvers) = HandledPromise::with_resolvers(None);

    HandledPromise::get_send_only(target.clone(), "a");
    turn::run_until_idle();
    HandledPromise::get_send_only(target.clone(), "b");
    resolvers.resolve(next.clone()).unwrap();
    turn::run_until_idle();
    assert!(handler.calls().is_empty());

    next_resolvers
        .resolve_with_presence(handler.clone(), PresenceOptions::default())
        .unwrap();
    turn::run_until_idle();

    assert_eq!(handler.calls(), ["get a", "get b"]);
}

#[test]
fn sends_to_one_target_arrive_in_issue_order() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET));
    let (target, resolvers) = HandledPromise::with_resolvers(None);
    resolvers
        .resolve_with_presence(handler.clone(), PresenceOptions::default())
        .unwrap();

    let keys: Vec<String> = (0..8).map(|i| format!("k{i}")).collect();
    for key in &keys {
        HandledPromise::get_send_only(target.clone(), key.as_str());
    }
    turn::run_until_idle();

    let expected: Vec<String> = keys.iter().map(|k| format!("get {k}")).collect();
    assert_eq!(handler.calls(), expected);
}

#[test]
fn send_only_never_yields_a_value() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET).prop("x", 42));
    let message = Message::get("x").send_only();

    let reported = dispatch("test", &*handler, &message, &Value::Undefined, None).unwrap();

    assert_eq!(reported, Value::Undefined);
    assert_eq!(handler.calls(), ["get x"]);
}

#[test]
fn send_only_prefers_the_exact_method() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET | Operations::GET_SEND_ONLY));
    let message = Message::get("y").send_only();

    dispatch("test", &*handler, &message, &Value::Undefined, None).unwrap();

    assert_eq!(handler.calls(), ["getSendOnly y"]);
}
