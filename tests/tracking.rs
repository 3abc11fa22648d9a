mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{init_tracing, present, settle, Recorder};
use eventual_send::prelude::*;
use eventual_send::track::{self, DispatchFn};
use eventual_send::Config;

fn tracking(enabled: bool) {
    Config {
        track_turns: enabled,
        ..Config::default()
    }
    .install();
    track::uninstall();
}

#[test]
fn tracked_errors_name_the_send_site() {
    init_tracing();
    tracking(true);

    let err = settle(E::new(Value::Null).get("x")).unwrap_err();

    match &err {
        Error::Annotated { note, .. } => assert!(note.contains("tracking.rs"), "{note}"),
        other => panic!("expected an annotated error, got {other}"),
    }
    assert!(matches!(err.root(), Error::Usage(_)));
}

#[test]
fn synthesized_sends_carry_the_original_send_site() {
    init_tracing();
    tracking(true);
    let handler: Rc<dyn Handler> = Rc::new(Recorder::new(Operations::GET).prop("f", 5));
    let (remote, _presence) = present(handler);

    // `f` is read through `get` and then called, which fails locally.
    let err = settle(E::new(remote).call("f", vec![])).unwrap_err();

    match &err {
        Error::Annotated { note, .. } => {
            assert!(note.contains("tracking.rs"), "{note}");
            assert!(!note.contains("dispatch.rs"), "{note}");
        }
        other => panic!("expected an annotated error, got {other}"),
    }
    assert!(matches!(err.root(), Error::Usage(_)));
}

#[test]
fn untracked_errors_are_bare() {
    init_tracing();
    tracking(false);

    let err = settle(E::new(Value::Null).get("x")).unwrap_err();

    assert!(matches!(err, Error::Usage(_)));
}

#[test]
fn tracking_does_not_change_answers() {
    init_tracing();
    let obj = Object::new().with("x", 10);
    for enabled in [false, true] {
        tracking(enabled);
        assert_eq!(settle(E::new(obj.clone()).get("x")).unwrap(), Value::Int(10));
    }
}

#[test]
fn installed_wrapper_sees_every_dispatch() {
    init_tracing();
    tracking(true);
    let count = Rc::new(Cell::new(0));
    let seen = count.clone();
    track::install(move |inner: DispatchFn| {
        let seen = seen.clone();
        let wrapped: DispatchFn = Rc::new(move |name: &str, handler: Rc<dyn Handler>, target: Value| {
            seen.set(seen.get() + 1);
            inner(name, handler, target)
        });
        wrapped
    });

    let obj = Object::new().with("x", 1);
    assert_eq!(settle(E::new(obj.clone()).get("x")).unwrap(), Value::Int(1));
    let err = settle(E::new(Value::Null).get("x")).unwrap_err();

    assert_eq!(count.get(), 2);
    assert!(matches!(err, Error::Usage(_)), "custom wrapper replaces annotation");
    assert!(track::uninstall().is_some());
}
