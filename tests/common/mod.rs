#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use eventual_send::prelude::*;
use eventual_send::{Outcome, Presence};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Drive the turn queue until `promise` settles.
pub fn settle(promise: HandledPromise) -> Outcome {
    turn::block_on(promise).expect("promise never settled")
}

/// A handler that logs every call and answers from a fixed table.
pub struct Recorder {
    ops: Operations,
    props: Object,
    reply: Value,
    log: RefCell<Vec<String>>,
}

impl Recorder {
    pub fn new(ops: Operations) -> Self {
        Self {
            ops,
            props: Object::new(),
            reply: Value::Undefined,
            log: RefCell::new(Vec::new()),
        }
    }

    pub fn prop(self, key: &str, value: impl Into<Value>) -> Self {
        self.props.set(key, value);
        self
    }

    pub fn reply(self, value: impl Into<Value>) -> Self {
        Self {
            reply: value.into(),
            ..self
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn note(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

fn method_name(method: Option<&PropertyKey>) -> String {
    method.map_or_else(|| "-".to_owned(), |m| m.to_string())
}

impl Handler for Recorder {
    fn operations(&self) -> Operations {
        self.ops
    }

    fn get(&self, _target: &Value, key: &PropertyKey, _result: Option<&HandledPromise>) -> Result<Value> {
        self.note(format!("get {key}"));
        Ok(self.props.get(key))
    }

    fn get_send_only(
        &self,
        _target: &Value,
        key: &PropertyKey,
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.note(format!("getSendOnly {key}"));
        Ok(())
    }

    fn apply_function(
        &self,
        _target: &Value,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        self.note(format!("applyFunction/{}", args.len()));
        Ok(self.reply.clone())
    }

    fn apply_function_send_only(
        &self,
        _target: &Value,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.note(format!("applyFunctionSendOnly/{}", args.len()));
        Ok(())
    }

    fn apply_method(
        &self,
        _target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<Value> {
        self.note(format!("applyMethod {}/{}", method_name(method), args.len()));
        Ok(self.reply.clone())
    }

    fn apply_method_send_only(
        &self,
        _target: &Value,
        method: Option<&PropertyKey>,
        args: &[Value],
        _result: Option<&HandledPromise>,
    ) -> Result<()> {
        self.note(format!("applyMethodSendOnly {}/{}", method_name(method), args.len()));
        Ok(())
    }
}

/// A handled promise resolved to a fresh presence bound to `handler`.
pub fn present(handler: Rc<dyn Handler>) -> (HandledPromise, Presence) {
    let (promise, resolvers) = HandledPromise::with_resolvers(None);
    let settlement = resolvers
        .resolve_with_presence(handler, PresenceOptions::default())
        .unwrap();
    let presence = settlement.presence().cloned().unwrap();
    (promise, presence)
}
