//! A fake live API for exercising record/replay end to end.
//!
//! `ida_demo` exposes a value, plain functions, a raising function, a
//! callback-taking function and a `Cursor` class, enough to cover every
//! observable interaction the core records.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use reprox::{
    ApiException, Arg, Args, AttrValue, ManagedModules, ModuleLoader, RecordSession,
    SessionConfig, Subject, SubjectError, SubjectKind, Value,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

/// Install the test tracing subscriber once; match-quality warnings show up
/// with `RUST_LOG=reprox=debug`.
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

type Behavior = Rc<dyn Fn(&Args) -> Result<AttrValue, SubjectError>>;

pub struct FakeFunction {
    name: String,
    behavior: Behavior,
}

impl FakeFunction {
    pub fn new(
        name: &str,
        behavior: impl Fn(&Args) -> Result<AttrValue, SubjectError> + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: Rc::new(behavior),
        })
    }
}

impl Subject for FakeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SubjectKind {
        SubjectKind::Function
    }

    fn attr(&self, name: &str) -> Result<AttrValue, SubjectError> {
        Err(SubjectError::NoSuchAttribute(name.to_string()))
    }

    fn call(&self, args: &Args) -> Result<AttrValue, SubjectError> {
        (self.behavior)(args)
    }
}

pub struct FakeInstance {
    class_name: String,
    ctor_args: Vec<Value>,
}

impl Subject for FakeInstance {
    fn name(&self) -> &str {
        &self.class_name
    }

    fn kind(&self) -> SubjectKind {
        SubjectKind::Instance
    }

    fn attr(&self, name: &str) -> Result<AttrValue, SubjectError> {
        match name {
            "start" => Ok(AttrValue::Value(
                self.ctor_args.first().cloned().unwrap_or(Value::None),
            )),
            "tell" => {
                let start = self.ctor_args.first().cloned().unwrap_or(Value::None);
                Ok(AttrValue::Subject(FakeFunction::new("tell", move |_| {
                    Ok(AttrValue::Value(start.clone()))
                })))
            }
            other => Err(SubjectError::NoSuchAttribute(other.to_string())),
        }
    }

    fn repr(&self) -> String {
        // Volatile address suffix, like a real foreign handle repr.
        format!(
            "<{} at 0x{:x}>",
            self.class_name, self as *const _ as usize
        )
    }
}

pub struct FakeClass {
    name: String,
}

impl FakeClass {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl Subject for FakeClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SubjectKind {
        SubjectKind::Class
    }

    fn attr(&self, name: &str) -> Result<AttrValue, SubjectError> {
        Err(SubjectError::NoSuchAttribute(name.to_string()))
    }

    fn instantiate(&self, args: &Args) -> Result<Arc<dyn Subject>, SubjectError> {
        Ok(Arc::new(FakeInstance {
            class_name: self.name.clone(),
            ctor_args: args.positional_values(),
        }))
    }
}

pub struct FakeModule {
    name: String,
    attrs: BTreeMap<String, AttrValue>,
}

impl Subject for FakeModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SubjectKind {
        SubjectKind::Module
    }

    fn attr(&self, name: &str) -> Result<AttrValue, SubjectError> {
        self.attrs
            .get(name)
            .cloned()
            .ok_or_else(|| SubjectError::NoSuchAttribute(name.to_string()))
    }
}

/// The demo module: everything the integration tests record against.
pub fn ida_demo() -> Arc<FakeModule> {
    let mut attrs: BTreeMap<String, AttrValue> = BTreeMap::new();

    attrs.insert(
        "BADADDR".to_string(),
        AttrValue::Value(Value::Int(0xFFFF_FFFF)),
    );

    attrs.insert(
        "foo".to_string(),
        AttrValue::Subject(FakeFunction::new("foo", |args| {
            let a = args.positional_values();
            let result = match (a.first(), a.get(1)) {
                (Some(Value::Int(1)), Some(Value::Str(s))) if s == "x" => 42,
                (Some(Value::Int(2)), Some(Value::Str(s))) if s == "y" => 43,
                _ => 0,
            };
            Ok(AttrValue::Value(Value::Int(result)))
        })),
    );

    let counter = Cell::new(0i64);
    attrs.insert(
        "next_head".to_string(),
        AttrValue::Subject(FakeFunction::new("next_head", move |_| {
            let n = counter.get();
            counter.set(n + 1);
            Ok(AttrValue::Value(Value::Int(100 + n)))
        })),
    );

    attrs.insert(
        "fail".to_string(),
        AttrValue::Subject(FakeFunction::new("fail", |_| {
            Err(SubjectError::Raised(ApiException::new(
                "ValueError",
                vec![Value::Str("bad".to_string())],
            )))
        })),
    );

    attrs.insert(
        "fail_custom".to_string(),
        AttrValue::Subject(FakeFunction::new("fail_custom", |_| {
            Err(SubjectError::Raised(ApiException::new(
                "SwigHostError",
                vec![Value::Str("boom".to_string())],
            )))
        })),
    );

    attrs.insert(
        "visit_segments".to_string(),
        AttrValue::Subject(FakeFunction::new("visit_segments", |args| {
            let mut visited = 0i64;
            for cb in args.callbacks() {
                cb.invoke(&Args::new().arg(0x1000));
                cb.invoke(&Args::new().arg(0x2000));
                visited += 2;
            }
            Ok(AttrValue::Value(Value::Int(visited)))
        })),
    );

    attrs.insert(
        "Cursor".to_string(),
        AttrValue::Subject(FakeClass::new("Cursor")),
    );

    // Returns a stateful reader function; reachable only through a call's
    // return value, never as a module attribute.
    attrs.insert(
        "make_reader".to_string(),
        AttrValue::Subject(FakeFunction::new("make_reader", |_| {
            let pos = Cell::new(0i64);
            Ok(AttrValue::Subject(FakeFunction::new("reader", move |_| {
                let n = pos.get();
                pos.set(n + 1);
                Ok(AttrValue::Value(Value::Int(200 + n)))
            })))
        })),
    );

    // Accepts a proxied instance. Live runs answer through the attached
    // subject handle; the recorded identity carries the same ctor argument,
    // so replay matches and reproduces the answer without it.
    attrs.insert(
        "start_of".to_string(),
        AttrValue::Subject(FakeFunction::new("start_of", |args| {
            if let Some(Arg::Instance(inst)) = args.positional.first() {
                if let Some(live) = &inst.live {
                    return live.attr("start");
                }
            }
            Err(SubjectError::Raised(ApiException::new(
                "TypeError",
                vec![Value::Str("expected a Cursor".to_string())],
            )))
        })),
    );

    Arc::new(FakeModule {
        name: "ida_demo".to_string(),
        attrs,
    })
}

pub struct FakeLoader {
    modules: BTreeMap<String, Arc<dyn Subject>>,
}

impl FakeLoader {
    pub fn with_demo() -> Arc<Self> {
        let mut modules: BTreeMap<String, Arc<dyn Subject>> = BTreeMap::new();
        modules.insert("ida_demo".to_string(), ida_demo() as Arc<dyn Subject>);
        Arc::new(Self { modules })
    }
}

impl ModuleLoader for FakeLoader {
    fn can_resolve(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    fn load(&self, name: &str) -> anyhow::Result<Arc<dyn Subject>> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("unknown module `{name}`"))
    }
}

pub fn demo_config() -> SessionConfig {
    SessionConfig {
        modules: ManagedModules::with_prefix("ida_").alias("ida_demo_old", "ida_demo"),
        ..SessionConfig::default()
    }
}

pub fn demo_record_session() -> RecordSession {
    RecordSession::new(demo_config(), FakeLoader::with_demo())
}
