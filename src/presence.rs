//! Presences: local stand-ins for remote targets.
//!
//! A plain presence has no behavior of its own beyond identity. A proxy
//! presence routes direct (synchronous) access through caller-supplied traps,
//! and when created with a revoker callback it can be disabled for good.

use core::cell::RefCell;
use core::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::forest;
use crate::ids::PresenceId;
use crate::value::{PropertyKey, Value};

/// Traps for direct access to a proxy presence.
pub trait ProxyTraps {
    /// Property read. Defaults to `Undefined`.
    fn get(&self, key: &PropertyKey) -> Result<Value> {
        let _ = key;
        Ok(Value::Undefined)
    }

    /// Direct call. Defaults to a usage error.
    fn apply(&self, args: &[Value]) -> Result<Value> {
        let _ = args;
        Err(Error::usage("presence is not a function"))
    }
}

/// Options for an intercepting proxy presence.
pub struct ProxyOptions {
    /// Trap table consulted for direct access.
    pub traps: Rc<dyn ProxyTraps>,
    /// Receives the revoker. Without it the proxy cannot be revoked.
    pub revoker_callback: Option<Box<dyn FnOnce(Revoker)>>,
}

/// Options for `resolve_with_presence`.
#[derive(Default)]
pub struct PresenceOptions {
    /// Make the presence an intercepting proxy.
    pub proxy: Option<ProxyOptions>,
}

enum Kind {
    Plain,
    /// `None` once revoked.
    Proxy(RefCell<Option<Rc<dyn ProxyTraps>>>),
}

struct PresenceInner {
    id: PresenceId,
    kind: Kind,
}

impl Drop for PresenceInner {
    fn drop(&mut self) {
        forest::forget_presence(self.id);
    }
}

/// Opaque local placeholder for a remote target.
#[derive(Clone)]
pub struct Presence(Rc<PresenceInner>);

/// Permanently disables one proxy presence.
pub struct Revoker(Weak<PresenceInner>);

impl Revoker {
    /// Revoke. Every later operation on the presence fails with
    /// [`Error::Revoked`]. Revoking twice is harmless.
    pub fn revoke(&self) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        if let Kind::Proxy(traps) = &inner.kind {
            if traps.borrow_mut().take().is_some() {
                tracing::debug!(presence = %inner.id, "presence revoked");
            }
        }
    }
}

impl Presence {
    pub(crate) fn create(options: PresenceOptions) -> Presence {
        let Some(proxy) = options.proxy else {
            return Presence(Rc::new(PresenceInner {
                id: PresenceId::next(),
                kind: Kind::Plain,
            }));
        };
        let presence = Presence(Rc::new(PresenceInner {
            id: PresenceId::next(),
            kind: Kind::Proxy(RefCell::new(Some(proxy.traps))),
        }));
        if let Some(callback) = proxy.revoker_callback {
            callback(Revoker(Rc::downgrade(&presence.0)));
        }
        presence
    }

    /// Identity of this presence.
    pub fn id(&self) -> PresenceId {
        self.0.id
    }

    /// Whether this presence intercepts direct access.
    pub fn is_proxy(&self) -> bool {
        matches!(self.0.kind, Kind::Proxy(_))
    }

    /// Whether this presence has been revoked.
    pub fn is_revoked(&self) -> bool {
        match &self.0.kind {
            Kind::Plain => false,
            Kind::Proxy(traps) => traps.borrow().is_none(),
        }
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_revoked() {
            return Err(Error::Revoked);
        }
        Ok(())
    }

    fn traps(&self) -> Result<Option<Rc<dyn ProxyTraps>>> {
        match &self.0.kind {
            Kind::Plain => Ok(None),
            Kind::Proxy(traps) => traps.borrow().clone().map(Some).ok_or(Error::Revoked),
        }
    }

    /// Direct property read.
    pub fn get(&self, key: &PropertyKey) -> Result<Value> {
        match self.traps()? {
            Some(traps) => traps.get(key),
            None => Ok(Value::Undefined),
        }
    }

    /// Direct call.
    pub fn apply(&self, args: &[Value]) -> Result<Value> {
        match self.traps()? {
            Some(traps) => traps.apply(args),
            None => Err(Error::usage("presence is not a function")),
        }
    }
}

impl fmt::Debug for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Presence")
            .field("id", &self.0.id)
            .field("proxy", &self.is_proxy())
            .field("revoked", &self.is_revoked())
            .finish()
    }
}
