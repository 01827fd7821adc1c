//! Module interception: the seam where consumers ask for a module by name
//! and receive a recording proxy, a replay proxy, or the real thing.
//!
//! The underlying resolution chain is abstracted to two questions ("can you
//! resolve this name", "produce a subject for it"). The interceptor keeps a
//! reentrancy guard so that proxy construction resolving the real module
//! does not recurse, and a cache so repeated imports return the identical
//! proxy.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::proxy::{ApiObject, ApiValue};
use crate::subject::{Arg, Args, AttrValue, InstanceArg, Subject};
use crate::value::Value;

/// Resolves names to live subjects. Implemented by the transport/bridge
/// into the host process, and by test fakes.
pub trait ModuleLoader {
    fn can_resolve(&self, name: &str) -> bool;

    fn load(&self, name: &str) -> anyhow::Result<Arc<dyn Subject>>;
}

/// Which module names are intercepted: a fixed allow-list, a prefix rule,
/// and an alias map for modules renamed between API versions.
#[derive(Debug, Clone, Default)]
pub struct ManagedModules {
    pub names: BTreeSet<String>,
    pub prefixes: Vec<String>,
    pub aliases: BTreeMap<String, String>,
}

impl ManagedModules {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefixes: vec![prefix.into()],
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    pub fn alias(mut self, old: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(old.into(), canonical.into());
        self
    }

    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn is_managed(&self, name: &str) -> bool {
        self.names.contains(name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

pub enum Resolved {
    Proxied(Arc<dyn ApiObject>),
    /// Name declined (unmanaged, or mid-resolution); the real subject.
    Raw(Arc<dyn Subject>),
}

pub struct Interceptor {
    policy: ManagedModules,
    loader: Option<Arc<dyn ModuleLoader>>,
    loading: Mutex<BTreeSet<String>>,
    cache: Mutex<HashMap<String, Arc<dyn ApiObject>>>,
}

impl Interceptor {
    pub fn new(policy: ManagedModules, loader: Option<Arc<dyn ModuleLoader>>) -> Self {
        Self {
            policy,
            loader,
            loading: Mutex::new(BTreeSet::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ManagedModules {
        &self.policy
    }

    /// Resolve `name`, building a proxy with `build` on first managed
    /// resolution. Repeated imports of a managed name return the identical
    /// proxy handle.
    pub fn import(
        &self,
        name: &str,
        build: &dyn Fn(&str, Option<Arc<dyn Subject>>) -> Result<Arc<dyn ApiObject>>,
    ) -> Result<Resolved> {
        let canonical = self.policy.canonical(name).to_string();

        if !self.policy.is_managed(&canonical) {
            debug!(module = %canonical, "unmanaged, passing to real loader");
            return self.load_raw(&canonical).map(Resolved::Raw);
        }
        if self.loading.lock().contains(&canonical) {
            // Mid-resolution for this very name: decline so the real loader
            // proceeds instead of recursing into proxy construction.
            debug!(module = %canonical, "reentrant resolution declined");
            return self.load_raw(&canonical).map(Resolved::Raw);
        }
        if let Some(cached) = self.cache.lock().get(&canonical) {
            return Ok(Resolved::Proxied(cached.clone()));
        }

        self.loading.lock().insert(canonical.clone());
        let subject = match &self.loader {
            Some(_) => match self.load_raw(&canonical) {
                Ok(subject) => Some(subject),
                Err(e) => {
                    self.unmark(&canonical)?;
                    return Err(e);
                }
            },
            None => None,
        };
        let built = build(&canonical, subject);
        self.unmark(&canonical)?;
        let proxy = built?;
        self.cache.lock().insert(canonical, proxy.clone());
        Ok(Resolved::Proxied(proxy))
    }

    fn load_raw(&self, name: &str) -> Result<Arc<dyn Subject>> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::MissingModule(name.to_string()))?;
        if !loader.can_resolve(name) {
            return Err(Error::MissingModule(name.to_string()));
        }
        Ok(loader.load(name)?)
    }

    fn unmark(&self, name: &str) -> Result<()> {
        if !self.loading.lock().remove(name) {
            return Err(Error::ReentrantResolve(name.to_string()));
        }
        Ok(())
    }
}

/// Transparent adapter over a raw subject for names the interceptor
/// declines: same protocol, no recording.
pub struct RawModule {
    subject: Arc<dyn Subject>,
}

impl RawModule {
    pub fn new(subject: Arc<dyn Subject>) -> Self {
        Self { subject }
    }

    fn wrap(attr: AttrValue) -> ApiValue {
        match attr {
            AttrValue::Value(v) => ApiValue::Value(v),
            AttrValue::Subject(s) => ApiValue::Object(Arc::new(RawModule::new(s))),
            AttrValue::Exception(e) => ApiValue::Exception(e),
            AttrValue::ExceptionClass(n) => ApiValue::ExceptionClass(n),
            AttrValue::Opaque(r) => ApiValue::Opaque(r),
        }
    }
}

impl ApiObject for RawModule {
    fn name(&self) -> String {
        self.subject.name().to_string()
    }

    fn attr(&self, name: &str) -> Result<ApiValue> {
        self.subject
            .attr(name)
            .map(Self::wrap)
            .map_err(Error::from_subject)
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.subject
            .set_attr(name, value)
            .map_err(Error::from_subject)
    }

    fn del_attr(&self, name: &str) -> Result<()> {
        self.subject.del_attr(name).map_err(Error::from_subject)
    }

    fn call(&self, args: Args) -> Result<ApiValue> {
        self.subject
            .call(&args)
            .map(Self::wrap)
            .map_err(Error::from_subject)
    }

    fn as_arg(&self) -> Arg {
        Arg::Instance(InstanceArg {
            identity: Value::opaque(self.subject.repr()),
            live: Some(Arc::clone(&self.subject)),
        })
    }
}
