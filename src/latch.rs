//! Latch<T>: single-threaded mutual exclusion without atomics.
//!
//! Guards the forwarding tables. Every forest mutation takes the latch for
//! one synchronous step and releases it before any user code, handler code or
//! promise finalizer can run, so a re-entrant acquisition is a bug and panics
//! through `lock`. Finalizers use `try_lock` and defer their work instead.

use core::cell::{Cell, UnsafeCell};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Single-threaded latch protecting `T`.
///
/// - !Sync: must not be shared across threads.
/// - Lock acquisition is non-blocking; re-entrant locking panics.
pub(crate) struct Latch<T> {
    locked: Cell<bool>,
    inner: UnsafeCell<T>,
}

impl<T> Latch<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            locked: Cell::new(false),
            inner: UnsafeCell::new(value),
        }
    }

    /// Attempt to acquire the latch; returns `None` if already locked.
    #[inline]
    pub(crate) fn try_lock(&self) -> Option<LatchGuard<'_, T>> {
        if self.locked.get() {
            return None;
        }
        self.locked.set(true);
        Some(LatchGuard {
            latch: self,
            _marker: PhantomData,
        })
    }

    /// Acquire the latch or panic if already locked (non-reentrant).
    #[inline]
    pub(crate) fn lock(&self) -> LatchGuard<'_, T> {
        match self.try_lock() {
            Some(g) => g,
            None => panic!("forest latch: already locked (non-reentrant)"),
        }
    }
}

/// Guard returned from `Latch::lock`/`try_lock`, releases on drop.
///
/// The guard is !Send and !Sync to keep it on the owning thread.
pub(crate) struct LatchGuard<'a, T> {
    latch: &'a Latch<T>,
    _marker: PhantomData<*const ()>,
}

impl<T> Deref for LatchGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        // Safety: the guard holds exclusive logical access.
        unsafe { &*self.latch.inner.get() }
    }
}

impl<T> DerefMut for LatchGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard holds exclusive logical access.
        unsafe { &mut *self.latch.inner.get() }
    }
}

impl<T> Drop for LatchGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        debug_assert!(self.latch.locked.get(), "LatchGuard dropped when not locked");
        self.latch.locked.set(false);
    }
}
