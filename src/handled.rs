//! Handled promises: promises whose operations can be intercepted while they
//! are pending and routed to a presence's handler once they resolve.

use core::cell::RefCell;
use core::future::IntoFuture;
use core::ops::Deref;
use std::panic::Location;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::forest;
use crate::handler::{Handler, Message, PostponedHandler};
use crate::presence::{Presence, PresenceOptions};
use crate::promise::{Promise, Resolver, Settle};
use crate::send;
use crate::turn;
use crate::value::{PropertyKey, Value};

/// How a handled promise was first settled.
#[derive(Clone, Debug)]
pub enum Settlement {
    /// Resolved to this canonical value: a plain value, a presence, or the
    /// promise it now forwards to.
    Resolved(Value),
    /// Rejected with this reason.
    Rejected(Error),
}

impl Settlement {
    /// The resolved value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Settlement::Resolved(v) => Some(v),
            Settlement::Rejected(_) => None,
        }
    }

    /// The presence this settlement resolved to, if any.
    pub fn presence(&self) -> Option<&Presence> {
        self.value().and_then(Value::as_presence)
    }
}

/// A promise taking part in eventual sends.
#[derive(Clone, Debug)]
pub struct HandledPromise(Promise);

impl Deref for HandledPromise {
    type Target = Promise;

    fn deref(&self) -> &Promise {
        &self.0
    }
}

impl IntoFuture for HandledPromise {
    type Output = <Promise as IntoFuture>::Output;
    type IntoFuture = Settle;

    fn into_future(self) -> Settle {
        self.0.into_future()
    }
}

struct Shared {
    promise: Promise,
    resolver: Resolver,
    settled: RefCell<Option<Settlement>>,
    postponed: RefCell<Option<Rc<PostponedHandler>>>,
}

/// The three ways to settle a handled promise. Clones share state: the
/// first settlement through any clone wins and every later call returns it.
#[derive(Clone)]
pub struct Resolvers(Rc<Shared>);

impl HandledPromise {
    /// Construct a handled promise, running `executor` synchronously with
    /// its resolvers.
    ///
    /// Until it settles, operations sent to the promise go to
    /// `pending_handler`; without one, a [`PostponedHandler`] buffers them
    /// and replays them after settlement.
    pub fn new(executor: impl FnOnce(Resolvers), pending_handler: Option<Rc<dyn Handler>>) -> Self {
        let (promise, resolvers) = Self::with_resolvers(pending_handler);
        executor(resolvers);
        promise
    }

    /// Construct a handled promise and hand back its resolvers.
    pub fn with_resolvers(pending_handler: Option<Rc<dyn Handler>>) -> (Self, Resolvers) {
        let (promise, resolver) = Promise::pending();
        let mut postponed = None;
        let handler = match pending_handler {
            Some(handler) => handler,
            None => {
                let fresh = Rc::new(PostponedHandler::new());
                postponed = Some(fresh.clone());
                fresh as Rc<dyn Handler>
            }
        };
        forest::install_pending_handler(&promise, handler);
        let resolvers = Resolvers(Rc::new(Shared {
            promise: promise.clone(),
            resolver,
            settled: RefCell::new(None),
            postponed: RefCell::new(postponed),
        }));
        (HandledPromise(promise), resolvers)
    }

    /// Normalise `value` into a promise.
    ///
    /// A presence yields the promise it was created for, a promise is
    /// returned as is, a thenable is assimilated into a new handled promise
    /// after one turn, and anything else becomes a fulfilled promise.
    pub fn resolve(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Presence(presence) => match forest::promise_of(&presence) {
                Some(promise) => HandledPromise(promise),
                None => HandledPromise(Promise::resolved(presence)),
            },
            Value::Promise(promise) => HandledPromise(promise),
            Value::Thenable(thenable) => {
                let (promise, resolvers) = Self::with_resolvers(None);
                turn::enqueue(move || {
                    let on_reject = resolvers.clone();
                    thenable.then(
                        Box::new(move |v| report_settle_failure(resolvers.resolve(v))),
                        Box::new(move |e| report_settle_failure(on_reject.reject(e))),
                    );
                });
                promise
            }
            other => HandledPromise(Promise::resolved(other)),
        }
    }

    /// The underlying promise.
    pub fn into_promise(self) -> Promise {
        self.0
    }

    /// Eventual property read.
    #[track_caller]
    pub fn get(target: impl Into<Value>, key: impl Into<PropertyKey>) -> Self {
        send::handle_at(&target.into(), Message::get(key), Location::caller())
    }

    /// Eventual property read, result discarded.
    #[track_caller]
    pub fn get_send_only(target: impl Into<Value>, key: impl Into<PropertyKey>) {
        send::handle_at(&target.into(), Message::get(key).send_only(), Location::caller());
    }

    /// Eventual call of the target itself.
    #[track_caller]
    pub fn apply_function(target: impl Into<Value>, args: impl IntoIterator<Item = Value>) -> Self {
        send::handle_at(&target.into(), Message::apply_function(args), Location::caller())
    }

    /// Eventual call, result discarded.
    #[track_caller]
    pub fn apply_function_send_only(target: impl Into<Value>, args: impl IntoIterator<Item = Value>) {
        send::handle_at(
            &target.into(),
            Message::apply_function(args).send_only(),
            Location::caller(),
        );
    }

    /// Eventual method call.
    #[track_caller]
    pub fn apply_method(
        target: impl Into<Value>,
        method: impl Into<PropertyKey>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        let message = Message::apply_method(Some(method.into()), args);
        send::handle_at(&target.into(), message, Location::caller())
    }

    /// Eventual method call, result discarded.
    #[track_caller]
    pub fn apply_method_send_only(
        target: impl Into<Value>,
        method: impl Into<PropertyKey>,
        args: impl IntoIterator<Item = Value>,
    ) {
        let message = Message::apply_method(Some(method.into()), args).send_only();
        send::handle_at(&target.into(), message, Location::caller());
    }
}

impl From<Promise> for HandledPromise {
    fn from(promise: Promise) -> Self {
        HandledPromise(promise)
    }
}

impl Resolvers {
    /// The promise these resolvers settle.
    pub fn promise(&self) -> HandledPromise {
        HandledPromise(self.0.promise.clone())
    }

    /// Whether the promise has been settled through any clone.
    pub fn is_settled(&self) -> bool {
        self.0.settled.borrow().is_some()
    }

    /// Resolve with `value`.
    ///
    /// A pending handled promise (or one bound to a presence) becomes the
    /// forwarding target of this one; anything else is the final value and
    /// the pending handler is dropped. Buffered operations are replayed in
    /// later turns, never inline.
    ///
    /// A corrupt forest is reported as `Err`, and the promise is rejected
    /// with the same error so nothing waits on it forever.
    pub fn resolve(&self, value: impl Into<Value>) -> Result<Settlement> {
        if let Some(first) = self.first() {
            return Ok(first);
        }
        match forest::commit_resolution(&self.0.promise, &value.into()) {
            Ok(value) => Ok(self.finish(Settlement::Resolved(value))),
            Err(error) => Err(self.abandon(error)),
        }
    }

    /// Reject with `reason`.
    pub fn reject(&self, reason: Error) -> Result<Settlement> {
        if let Some(first) = self.first() {
            return Ok(first);
        }
        if let Err(error) = forest::commit_rejection(&self.0.promise) {
            return Err(self.abandon(error));
        }
        Ok(self.finish(Settlement::Rejected(reason)))
    }

    /// Resolve to a new presence bound to `handler`. The created presence is
    /// in the returned settlement.
    pub fn resolve_with_presence(
        &self,
        handler: Rc<dyn Handler>,
        options: PresenceOptions,
    ) -> Result<Settlement> {
        if let Some(first) = self.first() {
            return Ok(first);
        }
        if let Err(error) = forest::ensure_not_forwarded(&self.0.promise) {
            return Err(self.abandon(error));
        }
        let presence = Presence::create(options);
        tracing::debug!(
            promise = %self.0.promise.id(),
            presence = %presence.id(),
            handler = %handler.label(),
            "bound presence"
        );
        forest::bind_presence(&self.0.promise, &presence, handler);
        self.resolve(presence)
    }

    fn first(&self) -> Option<Settlement> {
        self.0.settled.borrow().clone()
    }

    /// Record `settlement` as final and hand back the postponed handler, if
    /// this promise still owns one.
    fn record(&self, settlement: &Settlement) -> Option<Rc<PostponedHandler>> {
        *self.0.settled.borrow_mut() = Some(settlement.clone());
        self.0.postponed.borrow_mut().take()
    }

    fn settle_underlying(&self, settlement: &Settlement) {
        match settlement {
            Settlement::Resolved(value) => self.0.resolver.resolve(value.clone()),
            Settlement::Rejected(reason) => self.0.resolver.reject(reason.clone()),
        }
    }

    fn finish(&self, settlement: Settlement) -> Settlement {
        if let Some(postponed) = self.record(&settlement) {
            if postponed.buffered() > 0 {
                forest::begin_draining(&self.0.promise, postponed.clone());
            }
            postponed.continue_forwarding(Value::Promise(self.0.promise.clone()));
        }
        self.settle_underlying(&settlement);
        settlement
    }

    /// Settle after the forest refused the transition: reject with `error`
    /// and fail every buffered operation with it.
    fn abandon(&self, error: Error) -> Error {
        let settlement = Settlement::Rejected(error.clone());
        if let Some(postponed) = self.record(&settlement) {
            let failed = Promise::rejected(error.clone());
            failed.defuse();
            postponed.continue_forwarding(Value::Promise(failed));
        }
        self.settle_underlying(&settlement);
        error
    }
}

/// Log a settlement the forest refused. The promise has already been
/// rejected with the same error.
pub(crate) fn report_settle_failure(settled: Result<Settlement>) {
    if let Err(error) = settled {
        tracing::error!(%error, "settling a handled promise failed");
    }
}

#[cfg(test)]
mod tests {
    use super::HandledPromise;
    use crate::error::Error;
    use crate::forest;
    use crate::turn;
    use crate::value::Value;

    #[test]
    fn refused_resolution_rejects_buffered_sends() {
        let (target, resolvers) = HandledPromise::with_resolvers(None);
        let (elsewhere, _elsewhere_resolvers) = HandledPromise::with_resolvers(None);
        let answer = HandledPromise::get(target.clone(), "x");
        turn::run_until_idle();
        assert!(answer.is_pending());

        forest::corrupt_forward(&target, &elsewhere);
        let err = resolvers.resolve(Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::ForwardingInvariant(_)));
        assert!(resolvers.is_settled());
        assert!(matches!(target.outcome(), Some(Err(Error::ForwardingInvariant(_)))));

        turn::run_until_idle();
        match answer.outcome() {
            Some(Err(reason)) => assert!(matches!(reason.root(), Error::ForwardingInvariant(_))),
            other => panic!("buffered send should fail, got {other:?}"),
        }
    }

    #[test]
    fn refused_rejection_still_settles() {
        let (target, resolvers) = HandledPromise::with_resolvers(None);
        let (elsewhere, _elsewhere_resolvers) = HandledPromise::with_resolvers(None);
        forest::corrupt_forward(&target, &elsewhere);

        let err = resolvers.reject(Error::usage("nope")).unwrap_err();

        assert!(matches!(err, Error::ForwardingInvariant(_)));
        assert!(matches!(target.outcome(), Some(Err(Error::ForwardingInvariant(_)))));
    }
}
