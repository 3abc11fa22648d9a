//! Error taxonomy for the eventual-send core.

use std::borrow::Cow;

use thiserror::Error;

use crate::handler::OpName;
use crate::value::Value;

/// Errors produced by the protocol, and rejection reasons carried by promises.
///
/// `Clone`, because a single rejection fans out to every reaction registered
/// on the rejected promise.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Protocol misuse or a local type error (reading from `undefined`,
    /// calling something that is not a function).
    #[error("usage error: {0}")]
    Usage(Cow<'static, str>),

    /// A handler lacks every method that could satisfy the operation.
    #[error("{handler} is defined but has no methods needed for {operation} (has {methods:?})")]
    UnsupportedOperation {
        /// The operation originally requested.
        operation: OpName,
        /// Label of the handler that was asked.
        handler: String,
        /// Sorted names of the methods the handler does implement.
        methods: Vec<&'static str>,
    },

    /// The forwarding forest is corrupt. Never expected to surface.
    #[error("internal: {0}")]
    ForwardingInvariant(Cow<'static, str>),

    /// The presence was revoked by its owner.
    #[error("presence has been revoked")]
    Revoked,

    /// Application-level rejection with an arbitrary reason.
    #[error("rejected with {0:?}")]
    Rejected(Value),

    /// An error with diagnostic context attached by turn tracking.
    #[error("{source} ({note})")]
    Annotated {
        /// Where and when the failing operation was sent.
        note: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Build a usage error.
    pub fn usage(msg: impl Into<Cow<'static, str>>) -> Self {
        Error::Usage(msg.into())
    }

    /// Build an application rejection.
    pub fn rejected(reason: impl Into<Value>) -> Self {
        Error::Rejected(reason.into())
    }

    /// Strip diagnostic annotations.
    pub fn root(&self) -> &Error {
        match self {
            Error::Annotated { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
