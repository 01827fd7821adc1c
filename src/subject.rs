//! The declared protocol over the live external API.
//!
//! Instead of intercepting arbitrary attribute access, the live system is
//! abstracted behind [`Subject`]: name-keyed attribute lookup, calls and
//! instantiation, returning a tagged [`AttrValue`]. Recording wraps a
//! subject; replay implements the same caller-facing protocol from records
//! alone.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::callstack::Frame;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Module,
    Class,
    Function,
    Instance,
    /// Handle-like foreign value that is unsafe to proxy; passed through.
    Opaque,
}

/// An exception raised by the live API, or reconstructed from records.
/// Both modes surface the same type so test assertions are mode-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiException {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl ApiException {
    pub fn new(class_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class_name: class_name.into(),
            args,
        }
    }

    /// Conventionally the first constructor argument.
    pub fn message(&self) -> String {
        self.args.first().map(|v| v.to_string()).unwrap_or_default()
    }
}

impl fmt::Display for ApiException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.class_name)
        } else {
            write!(f, "{}: {}", self.class_name, self.message())
        }
    }
}

#[derive(Debug, Error)]
pub enum SubjectError {
    #[error("{0}")]
    Raised(ApiException),
    #[error("no attribute `{0}`")]
    NoSuchAttribute(String),
    #[error("not callable")]
    NotCallable,
    #[error("not instantiable")]
    NotInstantiable,
    #[error("attribute `{0}` is read-only")]
    ReadOnly(String),
}

/// What an attribute lookup or call on a subject yields.
#[derive(Clone)]
pub enum AttrValue {
    Value(Value),
    Subject(Arc<dyn Subject>),
    Exception(ApiException),
    ExceptionClass(String),
    Opaque(String),
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            AttrValue::Subject(s) => f.debug_tuple("Subject").field(&s.name()).finish(),
            AttrValue::Exception(e) => f.debug_tuple("Exception").field(e).finish(),
            AttrValue::ExceptionClass(n) => f.debug_tuple("ExceptionClass").field(n).finish(),
            AttrValue::Opaque(r) => f.debug_tuple("Opaque").field(r).finish(),
        }
    }
}

/// A caller-supplied callable passed into the API as an argument. The
/// subject may invoke it any number of times during a call.
#[derive(Clone)]
pub struct Callback {
    name: String,
    func: Arc<dyn Fn(&Args) -> Value>,
}

impl Callback {
    pub fn new(name: impl Into<String>, func: impl Fn(&Args) -> Value + 'static) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: &Args) -> Value {
        (self.func)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callback {}>", self.name)
    }
}

/// One argument position: a snapshot value, a previously recorded instance
/// (with the live subject attached in record mode), or a callback.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Instance(InstanceArg),
    Callback(Callback),
}

#[derive(Debug, Clone)]
pub struct InstanceArg {
    /// Normalized identity (`Value::Instance`) used for recording/matching.
    pub identity: Value,
    /// The live subject behind the proxy; absent during replay.
    pub live: Option<Arc<dyn Subject>>,
}

impl fmt::Debug for dyn Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Call arguments plus the precise call site, captured when the `Args` value
/// is constructed.
#[derive(Debug, Clone)]
pub struct Args {
    pub positional: Vec<Arg>,
    pub keyword: Vec<(String, Arg)>,
    site: Frame,
}

impl Args {
    #[track_caller]
    pub fn new() -> Self {
        Self {
            positional: Vec::new(),
            keyword: Vec::new(),
            site: Frame::from_location(Location::caller(), "<call>"),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(Arg::Value(value.into()));
        self
    }

    pub fn arg_instance(mut self, instance: InstanceArg) -> Self {
        self.positional.push(Arg::Instance(instance));
        self
    }

    /// Append a prebuilt argument, e.g. a proxy's `as_arg()`.
    pub fn arg_from(mut self, arg: Arg) -> Self {
        self.positional.push(arg);
        self
    }

    pub fn arg_callback(mut self, callback: Callback) -> Self {
        self.positional.push(Arg::Callback(callback));
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.push((key.into(), Arg::Value(value.into())));
        self
    }

    pub fn site(&self) -> &Frame {
        &self.site
    }

    /// Snapshot forms of the arguments: instances fold to their identity,
    /// callbacks to an opaque marker.
    pub fn positional_values(&self) -> Vec<Value> {
        self.positional.iter().map(arg_value).collect()
    }

    pub fn keyword_values(&self) -> BTreeMap<String, Value> {
        self.keyword
            .iter()
            .map(|(k, a)| (k.clone(), arg_value(a)))
            .collect()
    }

    pub fn callbacks(&self) -> impl Iterator<Item = &Callback> {
        self.positional
            .iter()
            .chain(self.keyword.iter().map(|(_, a)| a))
            .filter_map(|a| match a {
                Arg::Callback(cb) => Some(cb),
                _ => None,
            })
    }

    /// Rebuild plain-value arguments, used when replaying a recorded
    /// callback invocation.
    pub fn from_values(args: &[Value], kwargs: &BTreeMap<String, Value>) -> Self {
        let mut built = Args::new();
        for v in args {
            built = built.arg(v.clone());
        }
        for (k, v) in kwargs {
            built = built.kwarg(k.clone(), v.clone());
        }
        built
    }
}

impl Default for Args {
    fn default() -> Self {
        Self::new()
    }
}

fn arg_value(arg: &Arg) -> Value {
    match arg {
        Arg::Value(v) => v.clone(),
        Arg::Instance(i) => i.identity.clone(),
        Arg::Callback(cb) => Value::opaque(format!("<callback {}>", cb.name())),
    }
}

/// The live external API surface. Implemented by the transport/bridge that
/// talks to the host process, and by test fakes.
pub trait Subject {
    fn name(&self) -> &str;

    fn kind(&self) -> SubjectKind;

    fn attr(&self, name: &str) -> Result<AttrValue, SubjectError>;

    fn set_attr(&self, _name: &str, _value: Value) -> Result<(), SubjectError> {
        Ok(())
    }

    fn del_attr(&self, _name: &str) -> Result<(), SubjectError> {
        Ok(())
    }

    fn call(&self, _args: &Args) -> Result<AttrValue, SubjectError> {
        Err(SubjectError::NotCallable)
    }

    fn instantiate(&self, _args: &Args) -> Result<Arc<dyn Subject>, SubjectError> {
        Err(SubjectError::NotInstantiable)
    }

    /// Printable representation; may embed volatile address suffixes, which
    /// the normalizer strips before comparison.
    fn repr(&self) -> String {
        format!("<{}>", self.name())
    }
}
