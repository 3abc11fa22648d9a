//! Dynamic values flowing through eventual sends.
//!
//! Primitives and lists compare structurally; objects, functions, presences,
//! promises and thenables compare by identity.

use core::cell::RefCell;
use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::handled::HandledPromise;
use crate::presence::Presence;
use crate::promise::Promise;

/// Arguments of a function or method application.
pub type Args = SmallVec<[Value; 4]>;

/// Name of a property or method.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(Rc<str>);

impl PropertyKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<usize> for PropertyKey {
    fn from(i: usize) -> Self {
        Self(Rc::from(i.to_string()))
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The continuation protocol: anything that can register success and
/// failure continuations is treated as a promise and unwrapped.
pub trait Thenable {
    /// Register continuations. At most one of them is eventually called,
    /// at most once.
    fn then(&self, on_fulfilled: Box<dyn FnOnce(Value)>, on_rejected: Box<dyn FnOnce(Error)>);
}

/// A dynamic value.
#[derive(Clone, Default)]
pub enum Value {
    /// No value.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Immutable list.
    List(Rc<[Value]>),
    /// Local object with identity.
    Object(Object),
    /// Local callable.
    Function(Function),
    /// Placeholder for a remote target.
    Presence(Presence),
    /// Promise, handled or not.
    Promise(Promise),
    /// Foreign value implementing the continuation protocol.
    Thenable(Rc<dyn Thenable>),
}

impl Value {
    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect::<Vec<_>>().into())
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for values that take part in the continuation protocol.
    pub fn is_thenable(&self) -> bool {
        matches!(self, Value::Promise(_) | Value::Thenable(_))
    }

    /// The promise, if this is one.
    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    /// The presence, if this is one.
    pub fn as_presence(&self) -> Option<&Presence> {
        match self {
            Value::Presence(p) => Some(p),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Presence(_) => "presence",
            Value::Promise(_) => "promise",
            Value::Thenable(_) => "thenable",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{:?}", &**s),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Function(_) => f.write_str("[function]"),
            Value::Presence(p) => write!(f, "[{}]", p.id()),
            Value::Promise(p) => write!(f, "[{}]", p.id()),
            Value::Thenable(_) => f.write_str("[thenable]"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Presence(a), Value::Presence(b)) => a.id() == b.id(),
            (Value::Promise(a), Value::Promise(b)) => a.id() == b.id(),
            (Value::Thenable(a), Value::Thenable(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Presence> for Value {
    fn from(p: Presence) -> Self {
        Value::Presence(p)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}

impl From<HandledPromise> for Value {
    fn from(p: HandledPromise) -> Self {
        Value::Promise(p.into_promise())
    }
}

/// A local object: an identity-bearing bag of properties. Function-valued
/// properties are its methods.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<BTreeMap<PropertyKey, Value>>>);

impl Object {
    /// An empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property definition.
    pub fn with(self, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style method definition.
    pub fn method(
        self,
        name: impl Into<PropertyKey>,
        f: impl Fn(&Value, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.with(name, Function::new(f))
    }

    /// Read a property; missing properties read as `Undefined`.
    pub fn get(&self, key: &PropertyKey) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write a property.
    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    /// Own property names, sorted.
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value>;

/// A native callable. Receives the receiver (`Undefined` for bare calls)
/// and the arguments.
#[derive(Clone)]
pub struct Function(Rc<NativeFn>);

impl Function {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Value, &[Value]) -> Result<Value> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke with `receiver` and `args`.
    pub fn call(&self, receiver: &Value, args: &[Value]) -> Result<Value> {
        (self.0)(receiver, args)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}
