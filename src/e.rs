//! `E`: a convenience facade over the static send entry points.
//!
//! ```
//! use eventual_send::prelude::*;
//!
//! let counter = Object::new().method("incr", |_, args| {
//!     Ok(Value::Int(args.first().and_then(Value::as_int).unwrap_or(0) + 1))
//! });
//! let answer = E::new(counter).call("incr", [Value::Int(41)]);
//! assert_eq!(turn::block_on(answer).unwrap().unwrap(), Value::Int(42));
//! ```

use std::panic::Location;

use crate::error::{Error, Result};
use crate::handled::HandledPromise;
use crate::handler::Message;
use crate::promise::Promise;
use crate::send::handle_at;
use crate::value::{PropertyKey, Value};

/// Two-way eventual sends to one target.
#[derive(Clone, Debug)]
pub struct E {
    target: Value,
}

impl E {
    /// Address `target`.
    pub fn new(target: impl Into<Value>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Address `target` with one-way sends.
    pub fn send_only(target: impl Into<Value>) -> SendOnly {
        SendOnly {
            target: target.into(),
        }
    }

    /// Eventual property read.
    #[track_caller]
    pub fn get(&self, key: impl Into<PropertyKey>) -> HandledPromise {
        handle_at(&self.target, Message::get(key), Location::caller())
    }

    /// Eventual method call.
    #[track_caller]
    pub fn call(
        &self,
        method: impl Into<PropertyKey>,
        args: impl IntoIterator<Item = Value>,
    ) -> HandledPromise {
        let message = Message::apply_method(Some(method.into()), args);
        handle_at(&self.target, message, Location::caller())
    }

    /// Eventual call of the target itself.
    #[track_caller]
    pub fn invoke(&self, args: impl IntoIterator<Item = Value>) -> HandledPromise {
        handle_at(&self.target, Message::apply_function(args), Location::caller())
    }
}

/// One-way eventual sends to one target.
#[derive(Clone, Debug)]
pub struct SendOnly {
    target: Value,
}

impl SendOnly {
    /// Eventual property read, result discarded.
    #[track_caller]
    pub fn get(&self, key: impl Into<PropertyKey>) {
        handle_at(&self.target, Message::get(key).send_only(), Location::caller());
    }

    /// Eventual method call, result discarded.
    #[track_caller]
    pub fn call(&self, method: impl Into<PropertyKey>, args: impl IntoIterator<Item = Value>) {
        let message = Message::apply_method(Some(method.into()), args).send_only();
        handle_at(&self.target, message, Location::caller());
    }

    /// Eventual call of the target itself, result discarded.
    #[track_caller]
    pub fn invoke(&self, args: impl IntoIterator<Item = Value>) {
        let message = Message::apply_function(args).send_only();
        handle_at(&self.target, message, Location::caller());
    }
}

/// Register continuations on `value` once it resolves.
pub fn when<F, R>(value: impl Into<Value>, on_fulfilled: F, on_rejected: R) -> Promise
where
    F: FnOnce(Value) -> Result<Value> + 'static,
    R: FnOnce(Error) -> Result<Value> + 'static,
{
    HandledPromise::resolve(value).then(on_fulfilled, on_rejected)
}
