//! The record store: a nested tree of descriptors accumulated during one
//! recording session and consumed read-only during replay.
//!
//! Nodes are shared cells so that every cached proxy for a name accumulates
//! into the same record. A node's `value_type` is fixed on creation;
//! re-registering a name under a different type is a session-fatal
//! inconsistency.

pub mod serialize;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::callstack::Frame;
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Value,
    Module,
    Class,
    Function,
    Instance,
    Exception,
    ExceptionClass,
    Override,
}

/// One observed call (or instantiation). `call_index` counts invocations of
/// the owning name within one session, per call kind, starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, Value>,
    pub call_index: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callstack: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retval: Option<RecordCell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RecordCell>,
    /// Callback-argument name → function record scoped to this exact call.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub callback: BTreeMap<String, RecordCell>,
}

impl CallDescriptor {
    pub fn new(name: impl Into<String>, call_index: u64) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            call_index,
            callstack: Vec::new(),
            retval: None,
            exception: None,
            callback: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordNode {
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,
    /// Exception class name, for `exception` / `exception_class` records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Exception constructor arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<BTreeMap<String, Value>>,
    /// Named child records (module/instance attribute namespace).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, RecordCell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_data: Vec<CallDescriptor>,
    /// Instance records accumulated under a class node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_data: Vec<RecordCell>,
    /// How this instance was constructed; present on instance records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_desc: Option<CallDescriptor>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub call_count: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub instance_count: u64,
    /// Replay-side call cursor. Lives on the node, not the proxy, so every
    /// proxy over this record advances the same sequence. Never persisted.
    #[serde(skip)]
    pub replay_call_count: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl RecordNode {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            raw_data: None,
            class_name: None,
            args: None,
            kwargs: None,
            data: BTreeMap::new(),
            call_data: Vec::new(),
            instance_data: Vec::new(),
            instance_desc: None,
            call_count: 0,
            instance_count: 0,
            replay_call_count: 0,
        }
    }

    /// Next call index for this node, per call kind.
    pub fn next_call_index(&mut self) -> u64 {
        let idx = self.call_count;
        self.call_count += 1;
        idx
    }

    pub fn next_instance_index(&mut self) -> u64 {
        let idx = self.instance_count;
        self.instance_count += 1;
        idx
    }

    pub fn next_replay_index(&mut self) -> u64 {
        let idx = self.replay_call_count;
        self.replay_call_count += 1;
        idx
    }
}

/// Shared handle to a record node. Serializes as the node itself.
#[derive(Debug, Clone)]
pub struct RecordCell(Arc<Mutex<RecordNode>>);

impl RecordCell {
    pub fn new(node: RecordNode) -> Self {
        Self(Arc::new(Mutex::new(node)))
    }

    pub fn of_type(value_type: ValueType) -> Self {
        Self::new(RecordNode::new(value_type))
    }

    pub fn lock(&self) -> MutexGuard<'_, RecordNode> {
        self.0.lock()
    }

    pub fn value_type(&self) -> ValueType {
        self.lock().value_type
    }

    /// Get or create the named child record, enforcing `value_type`
    /// immutability. A type conflict on an existing name is fatal.
    pub fn child(&self, name: &str, value_type: ValueType) -> Result<RecordCell> {
        let mut node = self.lock();
        if let Some(existing) = node.data.get(name) {
            let existing_type = existing.value_type();
            if existing_type != value_type {
                return Err(Error::ValueTypeMismatch {
                    name: name.to_string(),
                    existing: existing_type,
                    requested: value_type,
                });
            }
            return Ok(existing.clone());
        }
        let cell = RecordCell::of_type(value_type);
        node.data.insert(name.to_string(), cell.clone());
        Ok(cell)
    }
}

impl Serialize for RecordCell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.lock().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordCell {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        RecordNode::deserialize(deserializer).map(RecordCell::new)
    }
}

/// Root of all recorded state: managed module name → record tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStore {
    #[serde(flatten)]
    pub modules: BTreeMap<String, RecordCell>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_module(&mut self, name: &str) -> RecordCell {
        self.modules
            .entry(name.to_string())
            .or_insert_with(|| RecordCell::of_type(ValueType::Module))
            .clone()
    }

    pub fn module(&self, name: &str) -> Option<RecordCell> {
        self.modules.get(name).cloned()
    }
}
