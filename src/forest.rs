//! The forwarding forest.
//!
//! Picture a forest whose roots are unresolved handled promises or promises
//! resolved to a presence or plain value, and where each node's parent is the
//! handled promise it was forwarded to. `shorten` finds a node's root with
//! path splitting, dropping the pending handlers of every node it passes
//! (only roots may carry one). Presences are final, so once a root is bound
//! to a presence every node on the walked path is rebound straight to it.
//!
//! The tables are identity keyed. Dropping the last reference to a promise or
//! presence removes its entries, and the presence→promise entry is weak, so
//! the tables never keep a key alive. All mutation happens under a
//! non-reentrant [`Latch`]; anything evicted while it is held is buried and
//! dropped only after the latch is released.

use core::any::Any;
use core::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::ids::{PresenceId, PromiseId};
use crate::latch::Latch;
use crate::presence::Presence;
use crate::promise::{Promise, WeakPromise};
use crate::value::Value;

#[derive(Default)]
struct Tables {
    forwarded: HashMap<PromiseId, Promise>,
    pending_handlers: HashMap<PromiseId, Rc<dyn Handler>>,
    promise_to_presence: HashMap<PromiseId, Presence>,
    presence_to_handler: HashMap<PresenceId, Rc<dyn Handler>>,
    presence_to_promise: HashMap<PresenceId, WeakPromise>,
    /// Postponed handlers still replaying after their promise settled.
    draining: HashMap<PromiseId, Rc<dyn Handler>>,
    graveyard: Vec<Box<dyn Any>>,
}

enum Forgotten {
    Promise(PromiseId),
    Presence(PresenceId),
}

thread_local! {
    static FOREST: Latch<Tables> = Latch::new(Tables::default());
    static DEFERRED: RefCell<Vec<Forgotten>> = const { RefCell::new(Vec::new()) };
}

fn with_tables<R>(f: impl FnOnce(&mut Tables) -> R) -> R {
    FOREST.with(|latch| {
        let (out, graveyard) = {
            let mut tables = latch.lock();
            for item in DEFERRED.with(|d| core::mem::take(&mut *d.borrow_mut())) {
                tables.forget(item);
            }
            let out = f(&mut tables);
            (out, core::mem::take(&mut tables.graveyard))
        };
        drop(graveyard);
        out
    })
}

fn forget(item: Forgotten) {
    let _ = FOREST.try_with(|latch| match latch.try_lock() {
        Some(mut tables) => {
            tables.forget(item);
            let graveyard = core::mem::take(&mut tables.graveyard);
            drop(tables);
            drop(graveyard);
        }
        None => {
            let _ = DEFERRED.try_with(|d| d.borrow_mut().push(item));
        }
    });
}

pub(crate) fn forget_promise(id: PromiseId) {
    forget(Forgotten::Promise(id));
}

pub(crate) fn forget_presence(id: PresenceId) {
    forget(Forgotten::Presence(id));
}

impl Tables {
    fn bury<T: Any>(&mut self, item: Option<T>) {
        if let Some(item) = item {
            self.graveyard.push(Box::new(item));
        }
    }

    fn forget(&mut self, item: Forgotten) {
        match item {
            Forgotten::Promise(id) => {
                let forwarded = self.forwarded.remove(&id);
                let handler = self.pending_handlers.remove(&id);
                let presence = self.promise_to_presence.remove(&id);
                let draining = self.draining.remove(&id);
                self.bury(forwarded);
                self.bury(draining);
                self.bury(handler);
                self.bury(presence);
            }
            Forgotten::Presence(id) => {
                let handler = self.presence_to_handler.remove(&id);
                self.bury(handler);
                self.presence_to_promise.remove(&id);
            }
        }
    }

    fn drop_pending(&mut self, id: PromiseId) {
        let handler = self.pending_handlers.remove(&id);
        self.bury(handler);
    }

    fn root_of(&self, start: &Promise) -> Promise {
        let mut root = start.clone();
        while let Some(parent) = self.forwarded.get(&root.id()) {
            root = parent.clone();
        }
        root
    }

    fn shorten(&mut self, target: &Value) -> Value {
        let Value::Promise(start) = target else {
            return target.clone();
        };
        let root = self.root_of(start);
        let mut node = start.clone();
        if let Some(presence) = self.promise_to_presence.get(&root.id()).cloned() {
            while node.id() != root.id() {
                let Some(parent) = self.forwarded.remove(&node.id()) else {
                    break;
                };
                self.drop_pending(node.id());
                let previous = self.promise_to_presence.insert(node.id(), presence.clone());
                self.bury(previous);
                tracing::trace!(promise = %node.id(), presence = %presence.id(), "hoisted presence");
                let done = core::mem::replace(&mut node, parent);
                self.bury(Some(done));
            }
        } else {
            while node.id() != root.id() {
                let Some(parent) = self.forwarded.insert(node.id(), root.clone()) else {
                    break;
                };
                self.drop_pending(node.id());
                let done = core::mem::replace(&mut node, parent);
                self.bury(Some(done));
            }
        }
        self.bury(Some(node));
        Value::Promise(root)
    }
}

/// What contestant B needs to know about a target, read in one step.
pub(crate) struct Canonical {
    pub(crate) value: Value,
    pub(crate) pending_handler: Option<Rc<dyn Handler>>,
    pub(crate) presence: Option<Presence>,
}

/// Whether a send should queue behind a settled promise's unfinished replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Replay {
    /// Fresh sends: a draining postponed handler of the target or its root
    /// takes the operation so it lands after the buffered ones.
    Queue,
    /// The replay itself, delivered past its own handler.
    Bypass,
}

pub(crate) fn canonicalize(target: &Value, replay: Replay) -> Canonical {
    with_tables(|t| {
        let draining = match (target, replay) {
            (Value::Promise(p), Replay::Queue) => t.draining.get(&p.id()).cloned(),
            _ => None,
        };
        let value = t.shorten(target);
        let (pending_handler, presence) = match &value {
            Value::Promise(p) => (
                draining
                    .or_else(|| match replay {
                        Replay::Queue => t.draining.get(&p.id()).cloned(),
                        Replay::Bypass => None,
                    })
                    .or_else(|| t.pending_handlers.get(&p.id()).cloned()),
                t.promise_to_presence.get(&p.id()).cloned(),
            ),
            _ => (None, None),
        };
        Canonical {
            value,
            pending_handler,
            presence,
        }
    })
}

/// Keep `handler` answering sends to the settled `promise` until its replay
/// finishes.
pub(crate) fn begin_draining(promise: &Promise, handler: Rc<dyn Handler>) {
    with_tables(|t| {
        let previous = t.draining.insert(promise.id(), handler);
        t.bury(previous);
    });
}

pub(crate) fn end_draining(promise: &Promise) {
    with_tables(|t| {
        let handler = t.draining.remove(&promise.id());
        t.bury(handler);
    });
}

pub(crate) fn install_pending_handler(promise: &Promise, handler: Rc<dyn Handler>) {
    with_tables(|t| {
        let previous = t.pending_handlers.insert(promise.id(), handler);
        t.bury(previous);
    });
}

pub(crate) fn ensure_not_forwarded(promise: &Promise) -> Result<()> {
    if with_tables(|t| t.forwarded.contains_key(&promise.id())) {
        return Err(already_forwarded(promise));
    }
    Ok(())
}

fn already_forwarded(promise: &Promise) -> Error {
    tracing::error!(promise = %promise.id(), "settling a promise that is already forwarded");
    Error::ForwardingInvariant(format!("{} already forwarded", promise.id()).into())
}

/// Table side of resolving `promise` with `value`, in one step. Returns the
/// canonical value the promise now stands for.
pub(crate) fn commit_resolution(promise: &Promise, value: &Value) -> Result<Value> {
    with_tables(|t| {
        if t.forwarded.contains_key(&promise.id()) {
            return Err(already_forwarded(promise));
        }
        let value = t.shorten(value);
        let target = match &value {
            Value::Promise(p)
                if t.pending_handlers.contains_key(&p.id())
                    || t.promise_to_presence.contains_key(&p.id()) =>
            {
                Some(p.clone())
            }
            _ => {
                t.drop_pending(promise.id());
                match &value {
                    Value::Presence(presence) => t
                        .presence_to_promise
                        .get(&presence.id())
                        .and_then(WeakPromise::upgrade),
                    _ => None,
                }
            }
        };
        match target {
            Some(target) if target.id() != promise.id() => {
                tracing::trace!(promise = %promise.id(), target = %target.id(), "forwarded");
                let previous = t.forwarded.insert(promise.id(), target);
                t.bury(previous);
            }
            other => {
                let previous = t.forwarded.remove(&promise.id());
                t.bury(previous);
                t.bury(other);
            }
        }
        let canonical = t.shorten(&Value::Promise(promise.clone()));
        t.bury(Some(canonical));
        t.drop_pending(promise.id());
        Ok(value)
    })
}

/// Table side of rejecting `promise`.
pub(crate) fn commit_rejection(promise: &Promise) -> Result<()> {
    with_tables(|t| {
        if t.forwarded.contains_key(&promise.id()) {
            return Err(already_forwarded(promise));
        }
        t.drop_pending(promise.id());
        Ok(())
    })
}

/// Bind `presence` to the promise it settles and to its handler. Both
/// entries are written together, once.
pub(crate) fn bind_presence(promise: &Promise, presence: &Presence, handler: Rc<dyn Handler>) {
    with_tables(|t| {
        t.presence_to_promise.insert(presence.id(), promise.downgrade());
        let previous = t.promise_to_presence.insert(promise.id(), presence.clone());
        t.bury(previous);
        let previous = t.presence_to_handler.insert(presence.id(), handler);
        t.bury(previous);
    });
}

/// Canonical node for `value`: the root of its forwarding tree, or `value`
/// itself when it is not a promise. Compresses the walked path.
pub fn shorten(value: &Value) -> Value {
    with_tables(|t| t.shorten(value))
}

/// Number of forwarding hops from `promise` to its root, without
/// compressing anything.
pub fn forwarding_depth(promise: &Promise) -> usize {
    with_tables(|t| {
        let mut depth = 0;
        let mut id = promise.id();
        while let Some(parent) = t.forwarded.get(&id) {
            id = parent.id();
            depth += 1;
        }
        depth
    })
}

/// The presence `promise` is known to resolve to, directly or hoisted.
pub fn presence_of(promise: &Promise) -> Option<Presence> {
    with_tables(|t| t.promise_to_presence.get(&promise.id()).cloned())
}

/// Whether `promise` still has a pending handler installed.
pub fn has_pending_handler(promise: &Promise) -> bool {
    with_tables(|t| t.pending_handlers.contains_key(&promise.id()))
}

/// The handler a presence is bound to.
pub fn handler_of(presence: &Presence) -> Option<Rc<dyn Handler>> {
    with_tables(|t| t.presence_to_handler.get(&presence.id()).cloned())
}

/// The promise a presence was created for, while that promise is alive.
pub fn promise_of(presence: &Presence) -> Option<Promise> {
    with_tables(|t| {
        t.presence_to_promise
            .get(&presence.id())
            .and_then(WeakPromise::upgrade)
    })
}

/// Record `from` as forwarded to `to` behind the resolution protocol's back.
#[cfg(test)]
pub(crate) fn corrupt_forward(from: &Promise, to: &Promise) {
    with_tables(|t| {
        let previous = t.forwarded.insert(from.id(), to.clone());
        t.bury(previous);
    });
}
