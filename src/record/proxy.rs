//! The recording proxy: forwards every operation to the live subject and
//! logs a replayable trace into the record store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::proxy::{ApiObject, ApiValue};
use crate::record::RecordCtx;
use crate::store::{CallDescriptor, RecordCell, ValueType};
use crate::subject::{ApiException, Arg, Args, AttrValue, Callback, InstanceArg, Subject, SubjectError, SubjectKind};
use crate::value::Value;

#[derive(Clone)]
pub struct RecordingProxy {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    subject: Arc<dyn Subject>,
    node: RecordCell,
    ctx: Arc<RecordCtx>,
    /// Cached object children; repeated access must accumulate into the
    /// same record node.
    children: Mutex<HashMap<String, ApiValue>>,
}

impl RecordingProxy {
    pub fn new(
        name: impl Into<String>,
        subject: Arc<dyn Subject>,
        node: RecordCell,
        ctx: Arc<RecordCtx>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                subject,
                node,
                ctx,
                children: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn wrap_attr(&self, name: &str, attr: AttrValue) -> Result<ApiValue> {
        let inner = &self.inner;
        match attr {
            AttrValue::Value(v) => {
                let cell = inner.node.child(name, ValueType::Value)?;
                cell.lock().raw_data = Some(v.clone());
                Ok(ApiValue::Value(v))
            }
            AttrValue::Subject(subject) => {
                let value_type = match subject.kind() {
                    SubjectKind::Module => ValueType::Module,
                    SubjectKind::Class => ValueType::Class,
                    SubjectKind::Function => ValueType::Function,
                    SubjectKind::Instance => ValueType::Instance,
                    SubjectKind::Opaque => {
                        warn!(attr = name, repr = %subject.repr(), "opaque handle passed through unproxied");
                        return Ok(ApiValue::Opaque(subject.repr()));
                    }
                };
                let cell = inner.node.child(name, value_type)?;
                let proxy =
                    RecordingProxy::new(name, subject, cell, Arc::clone(&inner.ctx));
                let api = ApiValue::Object(Arc::new(proxy));
                inner.children.lock().insert(name.to_string(), api.clone());
                Ok(api)
            }
            AttrValue::Exception(ex) => {
                let cell = inner.node.child(name, ValueType::Exception)?;
                {
                    let mut node = cell.lock();
                    node.class_name = Some(ex.class_name.clone());
                    node.args = Some(ex.args.clone());
                }
                Ok(ApiValue::Exception(ex))
            }
            AttrValue::ExceptionClass(class_name) => {
                let cell = inner.node.child(name, ValueType::ExceptionClass)?;
                cell.lock().class_name = Some(class_name.clone());
                Ok(ApiValue::ExceptionClass(class_name))
            }
            AttrValue::Opaque(repr) => {
                warn!(attr = name, %repr, "no defined encoding, passing through");
                Ok(ApiValue::Opaque(repr))
            }
        }
    }

    /// Record a call outcome (return value) as its own record cell.
    fn record_outcome(&self, name: &str, attr: AttrValue) -> (Option<RecordCell>, ApiValue) {
        match attr {
            AttrValue::Value(v) => {
                let cell = RecordCell::of_type(ValueType::Value);
                cell.lock().raw_data = Some(v.clone());
                (Some(cell), ApiValue::Value(v))
            }
            AttrValue::Subject(subject) => {
                let value_type = match subject.kind() {
                    SubjectKind::Module => ValueType::Module,
                    SubjectKind::Class => ValueType::Class,
                    SubjectKind::Function => ValueType::Function,
                    SubjectKind::Instance => ValueType::Instance,
                    SubjectKind::Opaque => {
                        warn!(%name, repr = %subject.repr(), "opaque handle passed through unproxied");
                        return (None, ApiValue::Opaque(subject.repr()));
                    }
                };
                let cell = RecordCell::of_type(value_type);
                let proxy = RecordingProxy::new(name, subject, cell.clone(), Arc::clone(&self.inner.ctx));
                (Some(cell), ApiValue::Object(Arc::new(proxy)))
            }
            AttrValue::Exception(ex) => {
                let cell = exception_cell(&ex);
                (Some(cell), ApiValue::Exception(ex))
            }
            AttrValue::ExceptionClass(class_name) => {
                let cell = RecordCell::of_type(ValueType::ExceptionClass);
                cell.lock().class_name = Some(class_name.clone());
                (Some(cell), ApiValue::ExceptionClass(class_name))
            }
            AttrValue::Opaque(repr) => {
                warn!(%name, %repr, "no defined encoding, passing through");
                (None, ApiValue::Opaque(repr))
            }
        }
    }

    /// Substitute caller-supplied callbacks with recording wrappers scoped
    /// to this call's own callback table.
    fn prepare_args(
        &self,
        args: &Args,
        table: &Arc<Mutex<BTreeMap<String, RecordCell>>>,
    ) -> Args {
        let mut prepared = args.clone();
        let wrap = |arg: &mut Arg| {
            if let Arg::Callback(cb) = arg {
                *arg = Arg::Callback(wrap_callback(cb.clone(), Arc::clone(table), Arc::clone(&self.inner.ctx)));
            }
        };
        prepared.positional.iter_mut().for_each(wrap);
        prepared.keyword.iter_mut().for_each(|(_, a)| wrap(a));
        prepared
    }

    fn call_function(&self, args: Args) -> Result<ApiValue> {
        let inner = &self.inner;
        let frames = inner.ctx.stack.capture(Some(args.site().clone()), &inner.ctx.filter);
        let call_index = inner.node.lock().next_call_index();

        let mut desc = CallDescriptor::new(inner.name.clone(), call_index);
        desc.args = args.positional_values();
        desc.kwargs = args.keyword_values();
        desc.callstack = frames;

        let table = Arc::new(Mutex::new(BTreeMap::new()));
        let prepared = self.prepare_args(&args, &table);

        debug!(name = %inner.name, call_index, "recording call");
        let outcome = inner.subject.call(&prepared);
        desc.callback = table.lock().clone();

        match outcome {
            Ok(attr) => {
                let (cell, api) = self.record_outcome("retval", attr);
                desc.retval = cell;
                inner.node.lock().call_data.push(desc);
                Ok(api)
            }
            Err(SubjectError::Raised(ex)) => {
                desc.exception = Some(exception_cell(&ex));
                inner.node.lock().call_data.push(desc);
                Err(Error::Raised(ex))
            }
            Err(other) => Err(Error::from_subject(other)),
        }
    }

    fn instantiate(&self, args: Args) -> Result<ApiValue> {
        let inner = &self.inner;
        let frames = inner.ctx.stack.capture(Some(args.site().clone()), &inner.ctx.filter);
        let call_index = inner.node.lock().next_instance_index();

        let mut desc = CallDescriptor::new(inner.name.clone(), call_index);
        desc.args = args.positional_values();
        desc.kwargs = args.keyword_values();
        desc.callstack = frames;

        let table = Arc::new(Mutex::new(BTreeMap::new()));
        let prepared = self.prepare_args(&args, &table);

        debug!(name = %inner.name, call_index, "recording instantiation");
        let instance = inner
            .subject
            .instantiate(&prepared)
            .map_err(Error::from_subject)?;
        desc.callback = table.lock().clone();

        let cell = RecordCell::of_type(ValueType::Instance);
        cell.lock().instance_desc = Some(desc);
        inner.node.lock().instance_data.push(cell.clone());

        let proxy = RecordingProxy::new(inner.name.clone(), instance, cell, Arc::clone(&inner.ctx));
        Ok(ApiValue::Object(Arc::new(proxy)))
    }
}

impl ApiObject for RecordingProxy {
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn attr(&self, name: &str) -> Result<ApiValue> {
        if let Some(cached) = self.inner.children.lock().get(name) {
            return Ok(cached.clone());
        }
        let attr = self
            .inner
            .subject
            .attr(name)
            .map_err(Error::from_subject)?;
        self.wrap_attr(name, attr)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        // Transparency, not an observation point.
        self.inner
            .subject
            .set_attr(name, value)
            .map_err(Error::from_subject)
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        self.inner
            .subject
            .del_attr(name)
            .map_err(Error::from_subject)
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
                None => Value::opaque(self.inner.subject.repr()),
            }
        };
        Arg::Instance(InstanceArg {
            identity,
            live: Some(Arc::clone(&self.inner.subject)),
        })
    }
}

fn exception_cell(ex: &ApiException) -> RecordCell {
    let cell = RecordCell::of_type(ValueType::Exception);
    {
        let mut node = cell.lock();
        node.class_name = Some(ex.class_name.clone());
        node.args = Some(ex.args.clone());
    }
    cell
}

/// Wrap a caller-supplied callback so every invocation the subject makes is
/// captured against the specific call that received it.
fn wrap_callback(
    user: Callback,
    table: Arc<Mutex<BTreeMap<String, RecordCell>>>,
    ctx: Arc<RecordCtx>,
) -> Callback {
    let name = user.name().to_string();
    Callback::new(name.clone(), move |cb_args: &Args| {
        let cell = table
            .lock()
            .entry(name.clone())
            .or_insert_with(|| RecordCell::of_type(ValueType::Function))
            .clone();
        let call_index = cell.lock().next_call_index();
        let mut desc = CallDescriptor::new(name.clone(), call_index);
        desc.args = cb_args.positional_values();
        desc.kwargs = cb_args.keyword_values();
        desc.callstack = ctx.stack.capture(Some(cb_args.site().clone()), &ctx.filter);

        let retval = user.invoke(cb_args);
        let rv_cell = RecordCell::of_type(ValueType::Value);
        rv_cell.lock().raw_data = Some(retval.clone());
        desc.retval = Some(rv_cell);
        cell.lock().call_data.push(desc);
        retval
    })
}
