#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]

//! Eventual send: asynchronous message passing to local values, pending
//! promises and presences of remote objects, with promise pipelining.
//!
//! Sends are delivered in later turns of a per-thread cooperative queue
//! ([`turn`]). A [`HandledPromise`] routes operations to its pending handler
//! while unresolved and to its presence's handler once resolved, and the
//! forwarding forest ([`forest`]) keeps promise chains one hop deep.

pub mod config;
pub mod e;
pub mod error;
pub mod forest;
pub mod handled;
pub mod handler;
mod ids;
mod latch;
pub mod presence;
pub mod promise;
pub mod send;
pub mod track;
pub mod turn;
pub mod value;

pub use config::Config;
pub use e::{when, SendOnly, E};
pub use error::{Error, Result};
pub use handled::{HandledPromise, Resolvers, Settlement};
pub use handler::{dispatch, Handler, LocalHandler, Message, Op, OpName, Operations, PostponedHandler};
pub use ids::{PresenceId, PromiseId};
pub use presence::{Presence, PresenceOptions, ProxyOptions, ProxyTraps, Revoker};
pub use promise::{Outcome, Promise, Resolver};
pub use send::{send, ForwardingHandler};
pub use value::{Args, Function, Object, PropertyKey, Thenable, Value};

/// Everything needed to send and handle messages.
pub mod prelude {
    pub use crate::e::{when, E};
    pub use crate::error::{Error, Result};
    pub use crate::handled::{HandledPromise, Resolvers, Settlement};
    pub use crate::handler::{dispatch, Handler, Message, Operations};
    pub use crate::presence::{PresenceOptions, ProxyOptions, ProxyTraps};
    pub use crate::turn;
    pub use crate::value::{Function, Object, PropertyKey, Value};
}
