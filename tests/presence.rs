mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{init_tracing, present, settle, Recorder};
use eventual_send::prelude::*;
use eventual_send::{forest, Revoker};

struct Echo;

impl ProxyTraps for Echo {
    fn get(&self, key: &PropertyKey) -> Result<Value> {
        Ok(Value::from(format!("trap:{key}")))
    }
}

fn revocable(handler: Rc<dyn Handler>) -> (HandledPromise, Value, Rc<RefCell<Option<Revoker>>>) {
    let slot = Rc::new(RefCell::new(None));
    let sink = slot.clone();
    let options = PresenceOptions {
        proxy: Some(ProxyOptions {
            traps: Rc::new(Echo),
            revoker_callback: Some(Box::new(move |revoker| {
                *sink.borrow_mut() = Some(revoker);
            })),
        }),
    };
    let (promise, resolvers) = HandledPromise::with_resolvers(None);
    let settled = resolvers.resolve_with_presence(handler, options).unwrap();
    let presence = settled.value().cloned().unwrap();
    (promise, presence, slot)
}

#[test]
fn plain_presence_is_opaque() {
    init_tracing();
    let handler: Rc<dyn Handler> = Rc::new(Recorder::new(Operations::GET));
    let (_promise, presence) = present(handler);

    assert!(!presence.is_proxy());
    assert!(!presence.is_revoked());
    assert_eq!(presence.get(&"anything".into()).unwrap(), Value::Undefined);
    assert!(matches!(presence.apply(&[]), Err(Error::Usage(_))));
}

#[test]
fn proxy_traps_serve_direct_access() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET).prop("x", 1));
    let (_promise, presence, revoker) = revocable(handler.clone());
    let Value::Presence(direct) = &presence else {
        panic!("expected a presence");
    };

    assert!(direct.is_proxy());
    assert!(revoker.borrow().is_some());
    assert_eq!(direct.get(&"k".into()).unwrap(), Value::from("trap:k"));
    // Eventual sends still go to the bound handler.
    assert_eq!(settle(E::new(presence.clone()).get("x")).unwrap(), Value::Int(1));
    assert_eq!(handler.calls(), ["get x"]);
}

#[test]
fn revocation_fails_later_operations() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET).prop("x", 1));
    let (_promise, presence, revoker) = revocable(handler.clone());
    let Value::Presence(direct) = presence.clone() else {
        panic!("expected a presence");
    };

    revoker.borrow().as_ref().unwrap().revoke();
    revoker.borrow().as_ref().unwrap().revoke();

    assert!(direct.is_revoked());
    assert!(matches!(direct.get(&"k".into()), Err(Error::Revoked)));
    let err = settle(E::new(presence).get("x")).unwrap_err();
    assert!(matches!(err.root(), Error::Revoked));
    assert!(handler.calls().is_empty());
}

#[test]
fn presence_is_bound_both_ways() {
    init_tracing();
    let handler: Rc<dyn Handler> = Rc::new(Recorder::new(Operations::GET));
    let (promise, presence) = present(handler.clone());

    assert_eq!(forest::presence_of(&promise).map(|p| p.id()), Some(presence.id()));
    assert!(forest::handler_of(&presence).is_some_and(|h| Rc::ptr_eq(&h, &handler)));
    assert!(!forest::has_pending_handler(&promise));
}

#[test]
fn presence_entries_outlive_a_dropped_promise() {
    init_tracing();
    let handler = Rc::new(Recorder::new(Operations::GET).prop("x", 2));
    let (promise, presence) = present(handler.clone());
    drop(promise);
    turn::run_until_idle();

    assert!(forest::promise_of(&presence).is_none());
    assert_eq!(settle(HandledPromise::get(presence, "x")).unwrap(), Value::Int(2));
}
