//! The turn queue: cooperative single-threaded scheduling.
//!
//! Every promise reaction, every postponed replay and the one-turn delay of
//! the pending-handler contestant run as jobs on this per-thread FIFO queue.
//! A *turn* is one job. Nothing here is preemptive; a job runs to completion
//! before the next one starts.

use core::cell::{Cell, RefCell};
use core::future::{Future, IntoFuture};
use core::pin::pin;
use core::task::{Context, Poll};

use crossbeam_queue::SegQueue;

use crate::config::Config;
use crate::error::Error;
use crate::ids::PromiseId;
use crate::promise::{Promise, WeakPromise};

type Job = Box<dyn FnOnce()>;

/// A rejection nobody had observed when it settled.
struct Candidate {
    id: PromiseId,
    promise: WeakPromise,
    reason: Error,
}

/// Candidate count at which observed entries are pruned ahead of the sweep.
const PRUNE_AT: usize = 1024;

thread_local! {
    static QUEUE: SegQueue<Job> = SegQueue::new();
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static TURN: Cell<u64> = const { Cell::new(0) };
    static MAYBE_UNHANDLED: RefCell<Vec<Candidate>> = const { RefCell::new(Vec::new()) };
    static UNHANDLED: RefCell<Vec<Error>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as draining the queue.
///
/// Draining is not re-entrant: a job that asks to drain again gets no guard,
/// so jobs queued behind it keep their FIFO position.
struct DrainGuard {
    _private: (),
}

impl DrainGuard {
    fn enter() -> Option<Self> {
        if DRAINING.with(|d| d.replace(true)) {
            return None;
        }
        Some(Self { _private: () })
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|d| d.set(false));
    }
}

/// Schedule `job` to run in a later turn.
pub fn enqueue(job: impl FnOnce() + 'static) {
    QUEUE.with(|q| q.push(Box::new(job)));
}

/// Number of jobs waiting to run.
pub fn pending() -> usize {
    QUEUE.with(|q| q.len())
}

/// Number of turns run so far on this thread.
pub fn current_turn() -> u64 {
    TURN.with(|t| t.get())
}

/// Returns true while this thread is inside a turn.
pub fn is_draining() -> bool {
    DRAINING.with(|d| d.get())
}

fn run_one() -> bool {
    let Some(job) = QUEUE.with(|q| q.pop()) else {
        return false;
    };
    TURN.with(|t| t.set(t.get() + 1));
    job();
    true
}

/// Run turns until the queue is empty, returning how many ran.
///
/// Called from inside a turn this does nothing and returns 0.
pub fn run_until_idle() -> usize {
    let Some(_guard) = DrainGuard::enter() else {
        return 0;
    };
    let mut ran = 0;
    while run_one() {
        ran += 1;
    }
    tracing::trace!(ran, turn = current_turn(), "turn queue idle");
    sweep_unhandled();
    ran
}

/// Drive `future` to completion by running turns between polls.
///
/// Returns `None` if the queue runs dry while the future is still pending,
/// or when called from inside a turn.
pub fn block_on<F: IntoFuture>(future: F) -> Option<F::Output> {
    let _guard = DrainGuard::enter()?;
    let mut future = pin!(future.into_future());
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    let out = loop {
        if let Poll::Ready(out) = future.as_mut().poll(&mut cx) {
            break Some(out);
        }
        if !run_one() {
            break None;
        }
    };
    sweep_unhandled();
    out
}

/// Remember a promise that was rejected while nobody observed it.
///
/// Only a weak reference is kept: a candidate dropped before the sweep can
/// no longer be observed and is reported with the reason recorded here.
pub(crate) fn note_rejection(promise: &Promise, reason: Error) {
    MAYBE_UNHANDLED.with(|m| {
        let mut candidates = m.borrow_mut();
        candidates.push(Candidate {
            id: promise.id(),
            promise: promise.downgrade(),
            reason,
        });
        if candidates.len() >= PRUNE_AT && candidates.len().is_power_of_two() {
            candidates.retain(|c| !c.is_observed());
        }
    });
}

impl Candidate {
    fn is_observed(&self) -> bool {
        self.promise.upgrade().is_some_and(|p| p.is_handled())
    }
}

fn sweep_unhandled() {
    let candidates = MAYBE_UNHANDLED.with(|m| core::mem::take(&mut *m.borrow_mut()));
    if candidates.is_empty() || !Config::current().report_unhandled_rejections {
        return;
    }
    for candidate in candidates {
        if candidate.is_observed() {
            continue;
        }
        let Candidate { id, reason, .. } = candidate;
        tracing::warn!(promise = %id, %reason, "unhandled rejection");
        UNHANDLED.with(|u| u.borrow_mut().push(reason));
    }
}

/// Take the rejections reported as unhandled since the last call.
pub fn take_unhandled_rejections() -> Vec<Error> {
    UNHANDLED.with(|u| core::mem::take(&mut *u.borrow_mut()))
}
