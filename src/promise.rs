//! The promise cell underneath every handled promise.
//!
//! Reactions never run inline: settling a promise schedules one turn per
//! registered reaction, and registering on an already-settled promise
//! schedules the reaction for a later turn. Resolving with another promise or
//! a thenable adopts its eventual state.

use core::cell::{Cell, RefCell};
use core::fmt;
use core::future::{Future, IntoFuture};
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::forest;
use crate::ids::PromiseId;
use crate::turn;
use crate::value::{Thenable, Value};

/// Final state of a settled promise.
pub type Outcome = Result<Value>;

type Reaction = Box<dyn FnOnce(Outcome)>;

enum State {
    Pending(SmallVec<[Reaction; 2]>),
    Fulfilled(Value),
    Rejected(Error),
}

struct PromiseCell {
    id: PromiseId,
    state: RefCell<State>,
    handled: Cell<bool>,
}

impl Drop for PromiseCell {
    fn drop(&mut self) {
        forest::forget_promise(self.id);
    }
}

/// A promise with reference identity.
#[derive(Clone)]
pub struct Promise {
    cell: Rc<PromiseCell>,
}

#[derive(Clone)]
pub(crate) struct WeakPromise(Weak<PromiseCell>);

impl WeakPromise {
    pub(crate) fn upgrade(&self) -> Option<Promise> {
        self.0.upgrade().map(|cell| Promise { cell })
    }
}

/// Settles its promise. Clones share one "already resolved" flag, so only
/// the first call through any clone has an effect.
#[derive(Clone)]
pub struct Resolver {
    promise: Promise,
    done: Rc<Cell<bool>>,
}

impl Resolver {
    /// Resolve with `value`, adopting it if it is a promise or thenable.
    pub fn resolve(&self, value: impl Into<Value>) {
        if self.done.replace(true) {
            return;
        }
        self.promise.resolve_with(value.into());
    }

    /// Reject with `reason`.
    pub fn reject(&self, reason: Error) {
        if self.done.replace(true) {
            return;
        }
        self.promise.settle(Err(reason));
    }

    /// Settle from an outcome.
    pub fn settle(&self, outcome: Outcome) {
        match outcome {
            Ok(v) => self.resolve(v),
            Err(e) => self.reject(e),
        }
    }

    /// True once any clone has been used.
    pub fn is_done(&self) -> bool {
        self.done.get()
    }
}

impl Promise {
    /// A pending promise and its resolver.
    pub fn pending() -> (Promise, Resolver) {
        let promise = Promise {
            cell: Rc::new(PromiseCell {
                id: PromiseId::next(),
                state: RefCell::new(State::Pending(SmallVec::new())),
                handled: Cell::new(false),
            }),
        };
        let resolver = Resolver {
            promise: promise.clone(),
            done: Rc::new(Cell::new(false)),
        };
        (promise, resolver)
    }

    /// Run `executor` synchronously with the resolver of a new promise.
    pub fn new(executor: impl FnOnce(Resolver)) -> Promise {
        let (promise, resolver) = Promise::pending();
        executor(resolver);
        promise
    }

    /// A promise for `value`. A promise is returned as is.
    pub fn resolved(value: impl Into<Value>) -> Promise {
        match value.into() {
            Value::Promise(p) => p,
            other => {
                let (promise, resolver) = Promise::pending();
                resolver.resolve(other);
                promise
            }
        }
    }

    /// A promise rejected with `reason`.
    pub fn rejected(reason: Error) -> Promise {
        let (promise, resolver) = Promise::pending();
        resolver.reject(reason);
        promise
    }

    /// Identity of this promise.
    pub fn id(&self) -> PromiseId {
        self.cell.id
    }

    /// True while unsettled. A promise adopting another stays pending until
    /// the adopted one settles.
    pub fn is_pending(&self) -> bool {
        matches!(*self.cell.state.borrow(), State::Pending(_))
    }

    /// The outcome, once settled.
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.cell.state.borrow() {
            State::Pending(_) => None,
            State::Fulfilled(v) => Some(Ok(v.clone())),
            State::Rejected(e) => Some(Err(e.clone())),
        }
    }

    /// Mark the promise as observed so a rejection is never reported as
    /// unhandled. Explicit reactions still see the rejection.
    pub fn defuse(&self) {
        self.cell.handled.set(true);
    }

    pub(crate) fn is_handled(&self) -> bool {
        self.cell.handled.get()
    }

    pub(crate) fn downgrade(&self) -> WeakPromise {
        WeakPromise(Rc::downgrade(&self.cell))
    }

    /// Register a raw reaction, run in a later turn with the outcome.
    pub fn subscribe(&self, reaction: impl FnOnce(Outcome) + 'static) {
        self.cell.handled.set(true);
        let mut state = self.cell.state.borrow_mut();
        let outcome = match &mut *state {
            State::Pending(reactions) => {
                reactions.push(Box::new(reaction));
                return;
            }
            State::Fulfilled(v) => Ok(v.clone()),
            State::Rejected(e) => Err(e.clone()),
        };
        drop(state);
        turn::enqueue(move || reaction(outcome));
    }

    /// Derive a promise from the continuations' results.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
        R: FnOnce(Error) -> Result<Value> + 'static,
    {
        let (derived, resolver) = Promise::pending();
        self.subscribe(move |outcome| {
            let next = match outcome {
                Ok(v) => on_fulfilled(v),
                Err(e) => on_rejected(e),
            };
            resolver.settle(next);
        });
        derived
    }

    /// `then` with rejections passed through.
    pub fn map<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// `then` with fulfillments passed through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Error) -> Result<Value> + 'static,
    {
        self.then(Ok, on_rejected)
    }

    fn resolve_with(&self, value: Value) {
        match value {
            Value::Promise(q) if q.id() == self.id() => {
                self.settle(Err(Error::usage("promise resolved with itself")));
            }
            Value::Promise(q) => {
                let me = self.clone();
                turn::enqueue(move || q.subscribe(move |outcome| me.settle(outcome)));
            }
            Value::Thenable(t) => {
                let me = self.clone();
                turn::enqueue(move || me.assimilate(t));
            }
            other => self.settle(Ok(other)),
        }
    }

    fn assimilate(&self, thenable: Rc<dyn Thenable>) {
        let called = Rc::new(Cell::new(false));
        let (ok_called, ok_me) = (called.clone(), self.clone());
        let (err_called, err_me) = (called, self.clone());
        thenable.then(
            Box::new(move |v| {
                if !ok_called.replace(true) {
                    ok_me.resolve_with(v);
                }
            }),
            Box::new(move |e| {
                if !err_called.replace(true) {
                    err_me.settle(Err(e));
                }
            }),
        );
    }

    fn settle(&self, outcome: Outcome) {
        let reactions = {
            let mut state = self.cell.state.borrow_mut();
            let State::Pending(reactions) = &mut *state else {
                return;
            };
            let reactions = core::mem::take(reactions);
            *state = match &outcome {
                Ok(v) => State::Fulfilled(v.clone()),
                Err(e) => State::Rejected(e.clone()),
            };
            reactions
        };
        match &outcome {
            Err(reason) if reactions.is_empty() && !self.is_handled() => {
                turn::note_rejection(self, reason.clone());
            }
            _ => {}
        }
        for reaction in reactions {
            let outcome = outcome.clone();
            turn::enqueue(move || reaction(outcome));
        }
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.cell.state.borrow() {
            State::Pending(_) => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        write!(f, "Promise({}, {state})", self.id())
    }
}

impl Thenable for Promise {
    fn then(&self, on_fulfilled: Box<dyn FnOnce(Value)>, on_rejected: Box<dyn FnOnce(Error)>) {
        self.subscribe(move |outcome| match outcome {
            Ok(v) => on_fulfilled(v),
            Err(e) => on_rejected(e),
        });
    }
}

struct SettleSlot {
    outcome: Option<Outcome>,
    waker: Option<Waker>,
}

/// Future for a promise's outcome. Drive it with [`turn::block_on`].
pub struct Settle {
    promise: Option<Promise>,
    slot: Rc<RefCell<SettleSlot>>,
}

impl Future for Settle {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        if let Some(promise) = this.promise.take() {
            let slot = this.slot.clone();
            promise.subscribe(move |outcome| {
                let mut slot = slot.borrow_mut();
                slot.outcome = Some(outcome);
                if let Some(waker) = slot.waker.take() {
                    waker.wake();
                }
            });
        }
        let mut slot = this.slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl IntoFuture for Promise {
    type Output = Outcome;
    type IntoFuture = Settle;

    fn into_future(self) -> Settle {
        Settle {
            promise: Some(self),
            slot: Rc::new(RefCell::new(SettleSlot {
                outcome: None,
                waker: None,
            })),
        }
    }
}
