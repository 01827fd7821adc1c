//! The caller-facing protocol shared by recording and replay proxies.
//!
//! Consumers receive an `Arc<dyn ApiObject>` for a module name and never
//! learn which mode they are running in: attribute access and calls behave
//! identically, including raised exceptions.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::subject::{ApiException, Arg, Args};
use crate::value::Value;

/// Result of an attribute lookup or call through a proxy.
#[derive(Clone)]
pub enum ApiValue {
    Value(Value),
    Object(Arc<dyn ApiObject>),
    Exception(ApiException),
    ExceptionClass(String),
    /// Handle-like value passed through unproxied.
    Opaque(String),
}

impl ApiValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ApiValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Arc<dyn ApiObject>> {
        match self {
            ApiValue::Object(o) => Some(o.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for ApiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ApiValue::Object(o) => f.debug_tuple("Object").field(&o.name()).finish(),
            ApiValue::Exception(e) => f.debug_tuple("Exception").field(e).finish(),
            ApiValue::ExceptionClass(n) => f.debug_tuple("ExceptionClass").field(n).finish(),
            ApiValue::Opaque(r) => f.debug_tuple("Opaque").field(r).finish(),
        }
    }
}

/// Drop-in stand-in for a managed module, class, function or instance.
pub trait ApiObject {
    fn name(&self) -> String;

    fn attr(&self, name: &str) -> Result<ApiValue>;

    fn set_attr(&self, name: &str, value: Value) -> Result<()>;

    fn del_attr(&self, name: &str) -> Result<()>;

    /// Call a function/method proxy, or instantiate a class proxy.
    fn call(&self, args: Args) -> Result<ApiValue>;

    /// This object as a call argument: its recorded instance identity, plus
    /// the live subject when one exists.
    fn as_arg(&self) -> Arg;
}
