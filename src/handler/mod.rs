//! Handlers: the pluggable capability set behind eventual sends.
//!
//! A handler implements any subset of the six operations and advertises
//! which through [`Handler::operations`]. The [`dispatch`] adapter derives the
//! rest: send-only falls back to the two-way form, `apply_method` can be built
//! from `get` plus `apply_function`, and `apply_function` from `apply_method`
//! with no method name.

pub mod dispatch;
pub mod local;
pub mod postponed;

use std::borrow::Cow;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handled::HandledPromise;
use crate::value::{Args, PropertyKey, Value};

pub use dispatch::dispatch;
pub use local::LocalHandler;
pub use postponed::PostponedHandler;

bitflags! {
    /// The operations a handler implements directly.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Operations: u8 {
        /// `get`
        const GET = 1 << 0;
        /// `get_send_only`
        const GET_SEND_ONLY = 1 << 1;
        /// `apply_function`
        const APPLY_FUNCTION = 1 << 2;
        /// `apply_function_send_only`
        const APPLY_FUNCTION_SEND_ONLY = 1 << 3;
        /// `apply_method`
        const APPLY_METHOD = 1 << 4;
        /// `apply_method_send_only`
        const APPLY_METHOD_SEND_ONLY = 1 << 5;
    }
}

impl Operations {
    /// Names of the contained operations, sorted.
    pub fn names(self) -> Vec<&'static str> {
        let mut names: Vec<_> = OpName::ALL
            .iter()
            .filter(|op| self.contains(op.flag()))
            .map(|op| op.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Name of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpName {
    /// Property read.
    Get,
    /// Property read, result discarded.
    GetSendOnly,
    /// Call with no method name.
    ApplyFunction,
    /// Call, result discarded.
    ApplyFunctionSendOnly,
    /// Method call.
    ApplyMethod,
    /// Method call, result discarded.
    ApplyMethodSendOnly,
}

impl OpName {
    /// Every operation.
    pub const ALL: [OpName; 6] = [
        OpName::Get,
        OpName::GetSendOnly,
        OpName::ApplyFunction,
        OpName::ApplyFunctionSendOnly,
        OpName::ApplyMethod,
        OpName::ApplyMethodSendOnly,
    ];

    /// Wire-style name, e.g. `applyMethodSendOnly`.
    pub fn as_str(self) -> &'static str {
        match self {
            OpName::Get => "get",
            OpName::GetSendOnly => "getSendOnly",
            OpName::ApplyFunction => "applyFunction",
            OpName::ApplyFunctionSendOnly => "applyFunctionSendOnly",
            OpName::ApplyMethod => "applyMethod",
            OpName::ApplyMethodSendOnly => "applyMethodSendOnly",
        }
    }

    /// Whether the result is discarded.
    pub fn is_send_only(self) -> bool {
        matches!(
            self,
            OpName::GetSendOnly | OpName::ApplyFunctionSendOnly | OpName::ApplyMethodSendOnly
        )
    }

    /// The two-way form of this operation.
    pub fn base(self) -> OpName {
        match self {
            OpName::GetSendOnly => OpName::Get,
            OpName::ApplyFunctionSendOnly => OpName::ApplyFunction,
            OpName::ApplyMethodSendOnly => OpName::ApplyMethod,
            two_way => two_way,
        }
    }

    /// The matching flag.
    pub fn flag(self) -> Operations {
        match self {
            OpName::Get => Operations::GET,
            OpName::GetSendOnly => Operations::GET_SEND_ONLY,
            OpName::ApplyFunction => Operations::APPLY_FUNCTION,
            OpName::ApplyFunctionSendOnly => Operations::APPLY_FUNCTION_SEND_ONLY,
            OpName::ApplyMethod => Operations::APPLY_METHOD,
            OpName::ApplyMethodSendOnly => Operations::APPLY_METHOD_SEND_ONLY,
        }
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of an operation.
#[derive(Clone, Debug)]
pub enum Op {
    /// Read the named property.
    Get(PropertyKey),
    /// Call the target itself.
    ApplyFunction(Args),
    /// Call a method; `None` calls the target itself.
    ApplyMethod(Option<PropertyKey>, Args),
}

/// An operation plus its delivery mode.
#[derive(Clone, Debug)]
pub struct Message {
    /// What to do.
    pub op: Op,
    /// Discard the result.
    pub send_only: bool,
}

impl Message {
    /// `get`
    pub fn get(key: impl Into<PropertyKey>) -> Self {
        Self {
            op: Op::Get(key.into()),
            send_only: false,
        }
    }

    /// `applyFunction`
    pub fn apply_function(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            op: Op::ApplyFunction(args.into_iter().collect()),
            send_only: false,
        }
    }

    /// `applyMethod`
    pub fn apply_method(method: Option<PropertyKey>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            op: Op::ApplyMethod(method, args.into_iter().collect()),
            send_only: false,
        }
    }

    /// The send-only form of this message.
    pub fn send_only(self) -> Self {
        Self {
            send_only: true,
            ..self
        }
    }

    /// The operation name, including the send-only suffix.
    pub fn name(&self) -> OpName {
        match (&self.op, self.send_only) {
            (Op::Get(_), false) => OpName::Get,
            (Op::Get(_), true) => OpName::GetSendOnly,
            (Op::ApplyFunction(_), false) => OpName::ApplyFunction,
            (Op::ApplyFunction(_), true) => OpName::ApplyFunctionSendOnly,
            (Op::ApplyMethod(..), false) => OpName::ApplyMethod,
            (Op::ApplyMethod(..), true) => OpName::ApplyMethodSendOnly,
        }
    }
}

pub(crate) fn unsupported(operation: OpName, label: Cow<'_, str>, ops: Operations) -> Error {
    Error::UnsupportedOperation {
        operation,
        handler: label.into_owned(),
        methods: ops.names(),
    }
}

/// A capability set over the six operations.
///
/// Every method receives the target, the operation arguments, and the
/// result promise of the send being serviced (when there is one), so a
/// transport can settle that promise when its reply arrives and accept
/// further sends against it in the meantime.
///
/// Only the methods named by [`Handler::operations`] are ever called
/// through [`dispatch`]; the defaults report the operation as unsupported.
pub trait Handler {
    /// Which methods this handler implements.
    fn operations(&self) -> Operations;

    /// Name used in diagnostics.
    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed("handler")
    }

    /// Read `key` from `target`.
    fn get(&self, target: &Value, key: &PropertyKey, result: Option<&HandledPromise>) -> Result<Value> {
        let _ = (target, key, result);
        Err(unsupported(OpName::Get, self.label(), self.operations()))
    }

    /// Read `key` from `target`, result discarded.
    fn get_send_only(
        &self,
        target: &Value,
        key: &PropertyKey,
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        let _ = (target, key, result);
        Err(unsupported(OpName::GetSendOnly, self.label(), self.operations()))
    }

    /// Call `target`.
    fn apply_function(
        &self,
        target: &Value,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<Value> {
        let _ = (target, args, result);
        Err(unsupported(OpName::ApplyFunction, self.label(), self.operations()))
    }

    /// Call `target`, result discarded.
    fn apply_function_send_only(
        &self,
        target: &Value,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        let _ = (target, args, result);
        Err(unsupported(
            OpName::ApplyFunctionSendOnly,
            self.label(),
            self.operations(),
        ))
    }

    /// Call `method` on `target` (`None` calls `target` itself).
    fn apply_method(
        &self,
        target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<Value> {
        let _ = (target, method, args, result);
        Err(unsupported(OpName::ApplyMethod, self.label(), self.operations()))
    }

    /// Call `method` on `target`, result discarded.
    fn apply_method_send_only(
        &self,
        target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        result: Option<&HandledPromise>,
    ) -> Result<()> {
        let _ = (target, method, args, result);
        Err(unsupported(
            OpName::ApplyMethodSendOnly,
            self.label(),
            self.operations(),
        ))
    }
}
