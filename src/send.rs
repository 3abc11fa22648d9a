//! The send dispatcher.
//!
//! Every eventual send races two contestants for the returned promise:
//!
//! - the *direct* contestant waits for the target to resolve and delivers
//!   through the forwarding handler;
//! - the *pending* contestant waits one turn, canonicalises the target and
//!   wins at once if it finds a pending handler, a non-promise, or a promise
//!   already bound to a presence. A settled promise whose postponed
//!   operations are still replaying counts as pending until the replay ends,
//!   so later sends cannot overtake the buffered ones.
//!
//! The first to deliver settles the returned promise. The loser's outcome is
//! ignored.

use core::cell::Cell;
use std::borrow::Cow;
use std::panic::Location;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::forest::{self, Replay};
use crate::handled::{report_settle_failure, HandledPromise, Resolvers};
use crate::handler::{dispatch, Handler, LocalHandler, Message, Operations};
use crate::track::{self, DispatchFn};
use crate::turn;
use crate::value::{PropertyKey, Value};

/// Delivers to a presence's bound handler, or to the [`LocalHandler`] for
/// plain values.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForwardingHandler;

impl ForwardingHandler {
    fn forward(&self, target: &Value, message: Message, result: Option<&HandledPromise>) -> Result<Value> {
        if let Value::Presence(presence) = target {
            presence.ensure_live()?;
            if let Some(handler) = forest::handler_of(presence) {
                return dispatch("presenceHandler", &*handler, &message, target, result);
            }
        }
        dispatch("localHandler", &LocalHandler, &message, target, result)
    }
}

impl Handler for ForwardingHandler {
    fn operations(&self) -> Operations {
        Operations::all()
    }

    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed("forwarding")
    }

    fn get(&self, target: &Value, key: &PropertyKey, result: Option<&HandledPromise>) -> Result<Value> {
        self.forward(target, Message::get(key.clone()), result)
    }

    fn get_send_only(
        &self,
        target: &Value,
        key: &PropertyKey,
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.forward(target, Message::get(key.clone()).send_only(), result)
            .map(drop)
    }

    fn apply_function(
        &self,
        target: &Value,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<Value> {
        self.forward(target, Message::apply_function(args.iter().cloned()), result)
    }

    fn apply_function_send_only(
        &self,
        target: &Value,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        let message = Message::apply_function(args.iter().cloned()).send_only();
        self.forward(target, message, result).map(drop)
    }

    fn apply_method(
        &self,
        target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<Value> {
        let message = Message::apply_method(method.cloned(), args.iter().cloned());
        self.forward(target, message, result)
    }

    fn apply_method_send_only(
        &self,
        target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        let message = Message::apply_method(method.cloned(), args.iter().cloned()).send_only();
        self.forward(target, message, result).map(drop)
    }
}

struct Race {
    over: Cell<bool>,
    resolvers: Resolvers,
    dispatch: DispatchFn,
}

impl Race {
    fn win(&self, handler_name: &str, handler: Rc<dyn Handler>, o: Value) {
        if self.over.replace(true) {
            return;
        }
        let settled = match (self.dispatch)(handler_name, handler, o) {
            Ok(answer) => self.resolvers.resolve(answer),
            Err(reason) => self.resolvers.reject(reason),
        };
        report_settle_failure(settled);
    }

    fn lose(&self, reason: Error) {
        if self.over.replace(true) {
            return;
        }
        report_settle_failure(self.resolvers.reject(reason));
    }
}

fn forwarding() -> Rc<dyn Handler> {
    Rc::new(ForwardingHandler)
}

/// Send `message` to `target`, returning the promise for the answer.
#[track_caller]
pub fn send(target: &Value, message: Message) -> HandledPromise {
    handle_at(target, message, Location::caller())
}

pub(crate) fn handle_at(
    target: &Value,
    message: Message,
    site: &'static Location<'static>,
) -> HandledPromise {
    launch(target, message, site, Replay::Queue)
}

/// Re-send a postponed operation to the promise it was buffered on, past
/// that promise's own replay queue.
pub(crate) fn replay(target: &Value, message: Message, site: &'static Location<'static>) -> HandledPromise {
    launch(target, message, site, Replay::Bypass)
}

fn launch(
    target: &Value,
    message: Message,
    site: &'static Location<'static>,
    route: Replay,
) -> HandledPromise {
    let (returned, resolvers) = HandledPromise::with_resolvers(None);
    returned.defuse();

    let dispatch_fn: DispatchFn = {
        let result = returned.clone();
        Rc::new(move |handler_name: &str, handler: Rc<dyn Handler>, o: Value| {
            track::at_site(site, || {
                dispatch(handler_name, &*handler, &message, &o, Some(&result))
            })
        })
    };
    let race = Rc::new(Race {
        over: Cell::new(false),
        resolvers,
        dispatch: track::wrap(dispatch_fn, site),
    });

    let direct = race.clone();
    HandledPromise::resolve(target.clone()).subscribe(move |outcome| match outcome {
        Ok(o) => direct.win("forwardingHandler", forwarding(), o),
        Err(reason) => direct.lose(reason),
    });

    let target = target.clone();
    turn::enqueue(move || {
        let canonical = forest::canonicalize(&target, route);
        if let Some(pending) = canonical.pending_handler {
            race.win("pendingHandler", pending, canonical.value);
        } else if !canonical.value.is_thenable() {
            race.win("forwardingHandler", forwarding(), canonical.value);
        } else if let Some(presence) = canonical.presence {
            race.win("forwardingHandler", forwarding(), Value::Presence(presence));
        }
    });

    returned
}
