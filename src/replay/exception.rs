//! Reconstructing recorded exceptions.
//!
//! Class names resolve only against a fixed set of well-known exception
//! types. An unrecognized name degrades to the generic "Exception" rather
//! than instantiating whatever the record file names.

use tracing::warn;

use crate::store::RecordNode;
use crate::subject::ApiException;

pub const GENERIC_EXCEPTION: &str = "Exception";

const KNOWN_EXCEPTIONS: &[&str] = &[
    "BaseException",
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "IOError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

pub fn resolve_class_name(name: &str) -> String {
    if KNOWN_EXCEPTIONS.contains(&name) {
        name.to_string()
    } else {
        warn!(class_name = %name, "unknown exception class in record, degrading to generic");
        GENERIC_EXCEPTION.to_string()
    }
}

/// Rebuild an exception from an `exception` record node.
pub fn from_node(node: &RecordNode) -> ApiException {
    let class_name = node
        .class_name
        .as_deref()
        .map(resolve_class_name)
        .unwrap_or_else(|| GENERIC_EXCEPTION.to_string());
    ApiException::new(class_name, node.args.clone().unwrap_or_default())
}
