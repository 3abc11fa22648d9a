//! Routing one message to one handler, filling gaps in its method set.

use std::panic::Location;

use crate::error::{Error, Result};
use crate::handled::HandledPromise;
use crate::send;
use crate::track;
use crate::value::Value;

use super::{unsupported, Handler, Message, Op, OpName, Operations};

/// Deliver `message` for `target` to `handler`.
///
/// `handler_name` is the role the handler plays (`pendingHandler`,
/// `forwardingHandler`, `presenceHandler`) and only appears in logs and
/// errors. `result` is passed through as the trailing argument.
///
/// Send-only messages always report `Undefined`. Sends synthesized here are
/// attributed to the send being dispatched, or to the caller outside one.
#[track_caller]
pub fn dispatch(
    handler_name: &str,
    handler: &dyn Handler,
    message: &Message,
    target: &Value,
    result: Option<&HandledPromise>,
) -> Result<Value> {
    let caller = Location::caller();
    let requested = message.name();
    let ops = handler.operations();
    tracing::debug!(handler = handler_name, operation = %requested, "dispatch");

    let mut actual = requested;
    if actual.is_send_only() && !ops.contains(actual.flag()) {
        actual = actual.base();
    }
    let discard = |value: Value| {
        if requested.is_send_only() {
            Value::Undefined
        } else {
            value
        }
    };

    if ops.contains(actual.flag()) {
        return invoke(handler, &message.op, actual.is_send_only(), target, result).map(discard);
    }

    match (&message.op, actual) {
        (Op::ApplyMethod(method, args), OpName::ApplyMethod) if ops.contains(Operations::GET) => {
            let site = track::current_site().unwrap_or(caller);
            let callee: Value = match method {
                Some(key) => send::handle_at(target, Message::get(key.clone()), site).into(),
                None => target.clone(),
            };
            let call = Message::apply_function(args.iter().cloned());
            Ok(discard(send::handle_at(&callee, call, site).into()))
        }
        (Op::ApplyFunction(args), OpName::ApplyFunction) if ops.contains(Operations::APPLY_METHOD) => {
            handler.apply_method(target, None, args, result).map(discard)
        }
        _ => Err(unsupported_by(handler_name, handler, requested)),
    }
}

fn unsupported_by(handler_name: &str, handler: &dyn Handler, operation: OpName) -> Error {
    let label = format!("{handler_name} ({})", handler.label());
    unsupported(operation, label.into(), handler.operations())
}

fn invoke(
    handler: &dyn Handler,
    op: &Op,
    send_only: bool,
    target: &Value,
    result: Option<&HandledPromise>,
) -> Result<Value> {
    match (op, send_only) {
        (Op::Get(key), false) => handler.get(target, key, result),
        (Op::Get(key), true) => handler
            .get_send_only(target, key, result)
            .map(|()| Value::Undefined),
        (Op::ApplyFunction(args), false) => handler.apply_function(target, args, result),
        (Op::ApplyFunction(args), true) => handler
            .apply_function_send_only(target, args, result)
            .map(|()| Value::Undefined),
        (Op::ApplyMethod(m, args), false) => handler.apply_method(target, m.as_ref(), args, result),
        (Op::ApplyMethod(m, args), true) => handler
            .apply_method_send_only(target, m.as_ref(), args, result)
            .map(|()| Value::Undefined),
    }
}
