//! Normalization of printable representations across runs.
//!
//! Live representations of foreign objects commonly embed a memory address
//! (`<segment at 0x7f3a90>`), which changes on every run. The normalizer
//! strips those suffixes and folds recorded-instance arguments to their
//! identity form so that a value captured during recording compares equal to
//! the same value seen during replay.

use std::collections::BTreeMap;

use regex::Regex;

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Normalizer {
    addr_suffix: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        // No look-around in the `regex` crate; match the closing '>' and put
        // it back in the replacement.
        Self {
            addr_suffix: Regex::new(r"\s+at\s+0x[0-9a-fA-F]+>")
                .unwrap_or_else(|e| unreachable!("static regex: {e}")),
        }
    }
}

impl Normalizer {
    /// Strip a trailing memory-address component from a printable
    /// representation.
    pub fn clean_repr(&self, repr: &str) -> String {
        self.addr_suffix.replace_all(repr, ">").into_owned()
    }

    /// Produce the comparison form of a value. Ints, bools and None are
    /// already stable; strings compare verbatim; containers recurse; opaque
    /// representations lose their address suffix; instance identities fold
    /// to a single string of name, args and kwargs.
    pub fn clean_value(&self, value: &Value) -> Value {
        match value {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
                value.clone()
            }
            Value::List(items) => {
                Value::List(items.iter().map(|v| self.clean_value(v)).collect())
            }
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.clean_value(v)))
                    .collect(),
            ),
            Value::Opaque { repr } => Value::opaque(self.clean_repr(repr)),
            Value::Instance { name, args, kwargs } => {
                Value::Str(self.instance_identity(name, args, kwargs))
            }
        }
    }

    fn instance_identity(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> String {
        let args: Vec<String> = args
            .iter()
            .map(|a| self.clean_value(a).to_string())
            .collect();
        let kwargs: Vec<String> = kwargs
            .iter()
            .map(|(k, v)| format!("{k}={}", self.clean_value(v)))
            .collect();
        format!("{name};[{}];{{{}}}", args.join(", "), kwargs.join(", "))
    }
}
