//! Direct operations on in-process values.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::handled::HandledPromise;
use crate::value::{PropertyKey, Value};

use super::{Handler, Operations};

/// Performs operations directly against the target. Used once a value is
/// known to be local rather than a presence bound to a handler.
///
/// Only the two-way methods are implemented; send-only requests fall back
/// to them through [`dispatch`](super::dispatch).
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalHandler;

fn keys_of(target: &Value) -> Vec<PropertyKey> {
    match target {
        Value::Object(o) => o.keys(),
        _ => Vec::new(),
    }
}

impl Handler for LocalHandler {
    fn operations(&self) -> Operations {
        Operations::GET | Operations::APPLY_FUNCTION | Operations::APPLY_METHOD
    }

    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed("local")
    }

    fn get(&self, target: &Value, key: &PropertyKey, _result: Option<&HandledPromise>) -> Result<Value> {
        match target {
            Value::Undefined | Value::Null => Err(Error::usage(format!(
                "cannot read property {key:?} of {}",
                target.type_name()
            ))),
            Value::Object(o) => Ok(o.get(key)),
            Value::List(items) => Ok(match key.as_str() {
                "length" => Value::Int(items.len() as i64),
                index => index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            }),
            Value::Str(s) if key.as_str() == "length" => Ok(Value::Int(s.chars().count() as i64)),
            Value::Presence(p) => p.get(key),
            _ => Ok(Value::Undefined),
        }
    }

    fn apply_function(
        &self,
        target: &Value,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        match target {
            Value::Function(f) => f.call(&Value::Undefined, args),
            Value::Presence(p) => p.apply(args),
            other => Err(Error::usage(format!(
                "cannot call a {}: not a function",
                other.type_name()
            ))),
        }
    }

    fn apply_method(
        &self,
        target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<Value> {
        let Some(method) = method else {
            return self.apply_function(target, args, result);
        };
        if target.is_nullish() {
            return Err(Error::usage(format!(
                "cannot deliver {method:?} to {}",
                target.type_name()
            )));
        }
        match self.get(target, method, result)? {
            Value::Function(f) => f.call(target, args),
            Value::Undefined => Err(Error::usage(format!(
                "target has no method {method:?}, has {:?}",
                keys_of(target)
            ))),
            other => Err(Error::usage(format!(
                "property {method:?} is a {}, not a function",
                other.type_name()
            ))),
        }
    }
}
