//! Identity counters for promises and presences.
//!
//! Side tables are keyed by these ids rather than by pointers, so an entry
//! never keeps its key alive and a recycled allocation can never alias an old
//! entry.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static PROMISE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static PRESENCE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of a promise cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

/// Identity of a presence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresenceId(u64);

impl PromiseId {
    pub(crate) fn next() -> Self {
        Self(PROMISE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logs.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl PresenceId {
    pub(crate) fn next() -> Self {
        Self(PRESENCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logs.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

impl fmt::Display for PresenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "presence#{}", self.0)
    }
}
