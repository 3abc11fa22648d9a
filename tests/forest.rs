mod common;

use std::rc::Rc;

use common::{init_tracing, Recorder};
use eventual_send::forest::{forwarding_depth, presence_of, shorten};
use eventual_send::prelude::*;
use proptest::prelude::*;

fn chain(len: usize) -> Vec<(HandledPromise, Resolvers)> {
    let links: Vec<_> = (0..=len).map(|_| HandledPromise::with_resolvers(None)).collect();
    for i in 0..len {
        links[i].1.resolve(links[i + 1].0.clone()).unwrap();
    }
    links
}

fn as_value(promise: &HandledPromise) -> Value {
    promise.clone().into()
}

proptest! {
    #[test]
    fn chains_compress_to_one_hop(len in 1usize..24, probe in 0usize..24) {
        init_tracing();
        let links = chain(len);
        let probe = probe % links.len();
        let root = as_value(&links[len].0);

        prop_assert_eq!(shorten(&as_value(&links[probe].0)), root.clone());
        prop_assert!(forwarding_depth(&links[probe].0) <= 1);

        for (promise, _) in &links {
            prop_assert_eq!(shorten(&as_value(promise)), root.clone());
        }
        for (promise, _) in &links {
            prop_assert!(forwarding_depth(promise) <= 1);
        }
        // Idempotent.
        prop_assert_eq!(shorten(&as_value(&links[probe].0)), root);
        drop(links);
        turn::run_until_idle();
    }

    #[test]
    fn presence_roots_are_hoisted(len in 1usize..16, probe in 0usize..16) {
        init_tracing();
        let links = chain(len);
        let probe = probe % links.len();
        let handler: Rc<dyn Handler> = Rc::new(Recorder::new(Operations::GET));
        let presence = links[len]
            .1
            .resolve_with_presence(handler, PresenceOptions::default())
            .unwrap()
            .presence()
            .cloned()
            .unwrap();

        shorten(&as_value(&links[probe].0));

        let hoisted = presence_of(&links[probe].0).map(|p| p.id());
        prop_assert_eq!(hoisted, Some(presence.id()));
        prop_assert_eq!(forwarding_depth(&links[probe].0), 0);

        turn::run_until_idle();
        let settled = links[0].0.outcome().and_then(Result::ok);
        prop_assert_eq!(settled, Some(Value::Presence(presence)));
    }
}

#[test]
fn plain_values_are_their_own_root() {
    init_tracing();
    assert_eq!(shorten(&Value::Int(3)), Value::Int(3));
    let (promise, _resolvers) = HandledPromise::with_resolvers(None);
    assert_eq!(forwarding_depth(&promise), 0);
    assert_eq!(shorten(&as_value(&promise)), as_value(&promise));
}

#[test]
fn resolving_into_a_settled_chain_does_not_forward() {
    init_tracing();
    let (a, resolve_a) = HandledPromise::with_resolvers(None);
    let (b, resolve_b) = HandledPromise::with_resolvers(None);
    resolve_b.resolve(7).unwrap();

    resolve_a.resolve(b.clone()).unwrap();

    assert_eq!(forwarding_depth(&a), 0);
    assert_eq!(common::settle(a).unwrap(), Value::Int(7));
}
