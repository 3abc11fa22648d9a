//! The default pending handler of a fresh handled promise.

use core::cell::RefCell;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::panic::Location;
use std::rc::Rc;

use crate::error::Result;
use crate::forest;
use crate::handled::{report_settle_failure, HandledPromise, Resolvers};
use crate::send;
use crate::track;
use crate::turn;
use crate::value::{PropertyKey, Value};

use super::{Handler, Message, Operations};

struct Record {
    message: Message,
    /// `None` for send-only operations.
    resolvers: Option<Resolvers>,
    site: &'static Location<'static>,
}

#[derive(Default)]
struct Queue {
    /// The settled promise, once forwarding began.
    target: Option<Value>,
    records: VecDeque<Record>,
}

/// Buffers operations sent to an unresolved promise and replays them, in
/// the order they arrived, once the promise settles.
///
/// While a replay is in progress the handler keeps accepting operations and
/// queues them behind the ones already buffered. The replay ends when the
/// queue is empty.
#[derive(Default)]
pub struct PostponedHandler {
    queue: Rc<RefCell<Queue>>,
}

impl PostponedHandler {
    /// A handler with nothing buffered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations waiting for replay.
    pub fn buffered(&self) -> usize {
        self.queue.borrow().records.len()
    }

    /// Start forwarding to `target`, the settled promise this handler was
    /// installed on. Each buffered operation is re-sent in its own turn, in
    /// order, and its continuation resolved with the answer. Only the first
    /// call has an effect.
    pub fn continue_forwarding(&self, target: Value) {
        let pending = {
            let mut queue = self.queue.borrow_mut();
            if queue.target.is_some() {
                return;
            }
            queue.target = Some(target.clone());
            queue.records.len()
        };
        if pending == 0 {
            return;
        }
        tracing::debug!(records = pending, target = ?target, "replaying postponed operations");
        for _ in 0..pending {
            schedule(&self.queue);
        }
    }

    fn postpone(&self, message: Message) -> Value {
        let (answer, resolvers) = if message.send_only {
            (Value::Undefined, None)
        } else {
            let (answer, resolvers) = HandledPromise::with_resolvers(None);
            (answer.into(), Some(resolvers))
        };
        let site = track::current_site().unwrap_or(Location::caller());
        let replaying = {
            let mut queue = self.queue.borrow_mut();
            queue.records.push_back(Record {
                message,
                resolvers,
                site,
            });
            queue.target.is_some()
        };
        if replaying {
            schedule(&self.queue);
        }
        answer
    }
}

/// One turn per record; each turn replays the oldest one left.
fn schedule(queue: &Rc<RefCell<Queue>>) {
    let queue = queue.clone();
    turn::enqueue(move || replay_next(&queue));
}

fn replay_next(queue: &RefCell<Queue>) {
    let (target, record, drained) = {
        let mut queue = queue.borrow_mut();
        let Some(target) = queue.target.clone() else {
            return;
        };
        let Some(record) = queue.records.pop_front() else {
            return;
        };
        (target, record, queue.records.is_empty())
    };
    if drained {
        if let Value::Promise(promise) = &target {
            forest::end_draining(promise);
        }
    }
    let answer = send::replay(&target, record.message, record.site);
    if let Some(resolvers) = record.resolvers {
        report_settle_failure(resolvers.resolve(answer));
    }
}

impl Handler for PostponedHandler {
    fn operations(&self) -> Operations {
        Operations::all()
    }

    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed("postponed")
    }

    fn get(&self, _target: &Value, key: &PropertyKey, _result: Option<&HandledPromise>) -> Result<Value> {
        Ok(self.postpone(Message::get(key.clone())))
    }

    fn get_send_only(
        &self,
        _target: &Value,
        key: &PropertyKey,
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.postpone(Message::get(key.clone()).send_only());
        Ok(())
    }

    fn apply_function(
        &self,
        _target: &Value,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        Ok(self.postpone(Message::apply_function(args.iter().cloned())))
    }

    fn apply_function_send_only(
        &self,
        _target: &Value,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.postpone(Message::apply_function(args.iter().cloned()).send_only());
        Ok(())
    }

    fn apply_method(
        &self,
        _target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        Ok(self.postpone(Message::apply_method(method.cloned(), args.iter().cloned())))
    }

    fn apply_method_send_only(
        &self,
        _target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.postpone(Message::apply_method(method.cloned(), args.iter().cloned()).send_only());
        Ok(())
    }
}
