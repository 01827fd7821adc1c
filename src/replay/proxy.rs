//! The replay proxy: wraps a record subtree and reconstructs attribute and
//! call results from recorded descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::proxy::{ApiObject, ApiValue};
use crate::replay::exception;
use crate::replay::matching::{self, MatchRequest};
use crate::replay::ReplayCtx;
use crate::store::{CallDescriptor, RecordCell, ValueType};
use crate::subject::{Arg, Args, InstanceArg};
use crate::value::Value;

/// Attribute names answering class-ancestry introspection; a real chain
/// cannot be rebuilt from data, so they resolve to a neutral empty value.
const INTROSPECTION_ATTRS: &[&str] = &["__bases__", "__mro__", "__subclasses__"];

#[derive(Clone)]
pub struct ReplayProxy {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    node: RecordCell,
    ctx: Arc<ReplayCtx>,
    children: Mutex<HashMap<String, ApiValue>>,
    /// Session-local shadow values; mask records, never persisted.
    overrides: Mutex<HashMap<String, Value>>,
}

impl ReplayProxy {
    pub fn new(name: impl Into<String>, node: RecordCell, ctx: Arc<ReplayCtx>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                node,
                ctx,
                children: Mutex::new(HashMap::new()),
                overrides: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn reconstruct_child(&self, name: &str, cell: RecordCell) -> Result<ApiValue> {
        let value_type = cell.value_type();
        match value_type {
            ValueType::Value | ValueType::Override => {
                let raw = cell.lock().raw_data.clone().unwrap_or(Value::None);
                Ok(ApiValue::Value(raw))
            }
            ValueType::Module
            | ValueType::Class
            | ValueType::Function
            | ValueType::Instance => {
                let proxy = ReplayProxy::new(name, cell, Arc::clone(&self.inner.ctx));
                let api = ApiValue::Object(Arc::new(proxy));
                self.inner
                    .children
                    .lock()
                    .insert(name.to_string(), api.clone());
                Ok(api)
            }
            ValueType::Exception => Ok(ApiValue::Exception(exception::from_node(&cell.lock()))),
            ValueType::ExceptionClass => {
                let class_name = cell
                    .lock()
                    .class_name
                    .as_deref()
                    .map(exception::resolve_class_name)
                    .unwrap_or_else(|| exception::GENERIC_EXCEPTION.to_string());
                Ok(ApiValue::ExceptionClass(class_name))
            }
        }
    }

    fn reconstruct_retval(&self, desc: &CallDescriptor) -> Result<ApiValue> {
        match &desc.retval {
            None => Ok(ApiValue::Value(Value::None)),
            Some(cell) => self.reconstruct_cell("retval", cell.clone()),
        }
    }

    /// Like `reconstruct_child` but without touching the children cache;
    /// call results are scoped to the call, not the attribute namespace.
    fn reconstruct_cell(&self, name: &str, cell: RecordCell) -> Result<ApiValue> {
        match cell.value_type() {
            ValueType::Value | ValueType::Override => {
                let raw = cell.lock().raw_data.clone().unwrap_or(Value::None);
                Ok(ApiValue::Value(raw))
            }
            ValueType::Exception => Ok(ApiValue::Exception(exception::from_node(&cell.lock()))),
            ValueType::ExceptionClass => {
                let class_name = cell
                    .lock()
                    .class_name
                    .as_deref()
                    .map(exception::resolve_class_name)
                    .unwrap_or_else(|| exception::GENERIC_EXCEPTION.to_string());
                Ok(ApiValue::ExceptionClass(class_name))
            }
            _ => Ok(ApiValue::Object(Arc::new(ReplayProxy::new(
                name,
                cell,
                Arc::clone(&self.inner.ctx),
            )))),
        }
    }

    /// Replay recorded callback invocations against currently supplied
    /// callables. Only the first recorded invocation per named slot is
    /// replayed; multiple distinct invocations per call are not
    /// disambiguated.
    fn replay_callbacks(&self, desc: &CallDescriptor, args: &Args) {
        for cb in args.callbacks() {
            let Some(fn_cell) = desc.callback.get(cb.name()) else {
                continue;
            };
            let recorded = fn_cell.lock().call_data.first().cloned();
            if let Some(call) = recorded {
                info!(callback = cb.name(), "replaying recorded callback invocation");
                let cb_args = Args::from_values(&call.args, &call.kwargs);
                cb.invoke(&cb_args);
            }
        }
    }

    fn call_function(&self, args: Args) -> Result<ApiValue> {
        let inner = &self.inner;
        let frames = inner
            .ctx
            .stack
            .capture(Some(args.site().clone()), &inner.ctx.filter);
        let call_index = inner.node.lock().next_replay_index();
        let positional = args.positional_values();
        let keyword = args.keyword_values();

        let request = MatchRequest {
            name: &inner.name,
            args: &positional,
            kwargs: &keyword,
            callstack: &frames,
            call_index,
        };

        let candidates: Vec<CallDescriptor> = inner.node.lock().call_data.clone();
        let scores: Vec<u64> = candidates
            .iter()
            .map(|desc| matching::score(&inner.ctx.weights, &inner.ctx.normalizer, &request, desc))
            .collect();
        let best = matching::select_best(&inner.name, &scores)?;
        let desc = &candidates[best];
        debug!(
            name = %inner.name,
            recorded_index = desc.call_index,
            replay_index = call_index,
            "replaying call"
        );

        self.replay_callbacks(desc, &args);

        if let Some(ex_cell) = &desc.exception {
            return Err(Error::Raised(exception::from_node(&ex_cell.lock())));
        }
        self.reconstruct_retval(desc)
    }

    fn instantiate(&self, args: Args) -> Result<ApiValue> {
        let inner = &self.inner;
        let frames = inner
            .ctx
            .stack
            .capture(Some(args.site().clone()), &inner.ctx.filter);
        let call_index = inner.node.lock().next_replay_index();
        let positional = args.positional_values();
        let keyword = args.keyword_values();

        let request = MatchRequest {
            name: &inner.name,
            args: &positional,
            kwargs: &keyword,
            callstack: &frames,
            call_index,
        };

        let cells: Vec<RecordCell> = inner.node.lock().instance_data.clone();
        let scores: Vec<u64> = cells
            .iter()
            .map(|cell| {
                let node = cell.lock();
                match &node.instance_desc {
                    Some(desc) => matching::score(
                        &inner.ctx.weights,
                        &inner.ctx.normalizer,
                        &request,
                        desc,
                    ),
                    // An instance record without a descriptor cannot win.
                    None => u64::MAX,
                }
            })
            .collect();
        let best = matching::select_best(&inner.name, &scores)?;
        let cell = cells[best].clone();
        debug!(name = %inner.name, replay_index = call_index, "replaying instantiation");

        Ok(ApiValue::Object(Arc::new(ReplayProxy::new(
            inner.name.clone(),
            cell,
            Arc::clone(&inner.ctx),
        ))))
    }
}

impl ApiObject for ReplayProxy {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn attr(&self, name: &str) -> Result<ApiValue> {
        if INTROSPECTION_ATTRS.contains(&name) {
            return Ok(ApiValue::Value(Value::List(Vec::new())));
        }
        if let Some(shadow) = self.inner.overrides.lock().get(name) {
            return Ok(ApiValue::Value(shadow.clone()));
        }
        if let Some(cached) = self.inner.children.lock().get(name) {
            return Ok(cached.clone());
        }
        let cell = self.inner.node.lock().data.get(name).cloned();
        match cell {
            Some(cell) => self.reconstruct_child(name, cell),
            None => Err(Error::MissingRecord {
                object: self.inner.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        debug!(object = %self.inner.name, attr = name, "override shadows recorded value");
        self.inner
            .overrides
            .lock()
            .insert(name.to_string(), value);
        Ok(())
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        // Dropping an override uncovers the recorded value, if any.
        self.inner.overrides.lock().remove(name);
        Ok(())
    }

    fn call(&self, args: Args) -> Result<ApiValue> {
        match self.inner.node.value_type() {
            ValueType::Class => self.instantiate(args),
            ValueType::Function | ValueType::Instance => self.call_function(args),
            _ => Err(Error::NotCallable(self.inner.name.clone())),
        }
    }

    fn as_arg(&self) -> Arg {
        let identity = {
            let node = self.inner.node.lock();
            match &node.instance_desc {
                Some(desc) => Value::Instance {
                    name: desc.name.clone(),
                    args: desc.args.clone(),
                    kwargs: desc.kwargs.clone(),
                },
                None => Value::opaque(format!("<{}>", self.inner.name)),
            }
        };
        Arg::Instance(InstanceArg {
            identity,
            live: None,
        })
    }
}
