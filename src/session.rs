//! Explicit session objects: one per recording run, one per replay run.
//!
//! A recording session owns the record store, is the only writer to it, and
//! serializes it exactly once at `finish`. A replay session deserializes a
//! store once and treats it as read-only; overrides live on the proxies and
//! die with the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::callstack::{StackFilter, StackScope};
use crate::error::{Error, Result};
use crate::intercept::{Interceptor, ManagedModules, ModuleLoader, RawModule, Resolved};
use crate::proxy::ApiObject;
use crate::record::{proxy::RecordingProxy, RecordCtx};
use crate::replay::{proxy::ReplayProxy, MatchWeights, ReplayCtx};
use crate::store::serialize::{load_store, save_store};
use crate::store::RecordStore;

const ENV_MODE: &str = "REPROX_MODE";
const ENV_REPLAY_FILE: &str = "REPROX_REPLAY_FILE";

/// How the caller wants the core to behave; selected externally, usually
/// from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Off,
    Record,
    Replay,
}

impl Mode {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var(ENV_MODE).unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "record" => Mode::Record,
            "replay" => Mode::Replay,
            _ => Mode::Off,
        }
    }
}

pub fn replay_file_from_env() -> Option<PathBuf> {
    std::env::var(ENV_REPLAY_FILE).ok().map(PathBuf::from)
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub modules: ManagedModules,
    pub weights: MatchWeights,
    pub stack_filter: StackFilter,
}

pub struct RecordSession {
    store: Mutex<RecordStore>,
    interceptor: Interceptor,
    ctx: Arc<RecordCtx>,
    finished: Mutex<bool>,
}

impl RecordSession {
    pub fn new(config: SessionConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            store: Mutex::new(RecordStore::new()),
            interceptor: Interceptor::new(config.modules, Some(loader)),
            ctx: RecordCtx::new(config.stack_filter),
            finished: Mutex::new(false),
        }
    }

    /// Import a module: managed names yield a recording proxy (stable
    /// across repeated imports), others pass through unrecorded.
    pub fn module(&self, name: &str) -> Result<Arc<dyn ApiObject>> {
        let resolved = self.interceptor.import(name, &|canonical, subject| {
            let subject =
                subject.ok_or_else(|| Error::MissingModule(canonical.to_string()))?;
            let cell = self.store.lock().ensure_module(canonical);
            Ok(Arc::new(RecordingProxy::new(
                canonical,
                subject,
                cell,
                Arc::clone(&self.ctx),
            )) as Arc<dyn ApiObject>)
        })?;
        Ok(match resolved {
            Resolved::Proxied(proxy) => proxy,
            Resolved::Raw(subject) => Arc::new(RawModule::new(subject)),
        })
    }

    /// Annotate the current caller for stack capture.
    #[track_caller]
    pub fn stack_scope(&self, function: &str) -> StackScope {
        self.ctx.stack.scope(function)
    }

    /// Serialize the session's records. Write-once: a second call is an
    /// error, and the store is not mutated afterwards by well-behaved
    /// callers.
    pub fn finish(&self, path: &Path) -> Result<()> {
        let mut finished = self.finished.lock();
        if *finished {
            return Err(Error::SessionFinished);
        }
        save_store(&self.store.lock(), path)?;
        *finished = true;
        Ok(())
    }
}

pub struct ReplaySession {
    store: RecordStore,
    interceptor: Interceptor,
    ctx: Arc<ReplayCtx>,
}

impl ReplaySession {
    pub fn load(config: SessionConfig, path: &Path) -> Result<Self> {
        let store = load_store(path)?;
        Ok(Self::from_store(config, store))
    }

    pub fn from_store(config: SessionConfig, store: RecordStore) -> Self {
        Self {
            store,
            interceptor: Interceptor::new(config.modules, None),
            ctx: ReplayCtx::new(config.stack_filter, config.weights),
        }
    }

    pub fn module(&self, name: &str) -> Result<Arc<dyn ApiObject>> {
        let resolved = self.interceptor.import(name, &|canonical, _subject| {
            let cell = self
                .store
                .module(canonical)
                .ok_or_else(|| Error::MissingModule(canonical.to_string()))?;
            Ok(
                Arc::new(ReplayProxy::new(canonical, cell, Arc::clone(&self.ctx)))
                    as Arc<dyn ApiObject>,
            )
        })?;
        match resolved {
            Resolved::Proxied(proxy) => Ok(proxy),
            Resolved::Raw(subject) => Ok(Arc::new(RawModule::new(subject))),
        }
    }

    #[track_caller]
    pub fn stack_scope(&self, function: &str) -> StackScope {
        self.ctx.stack.scope(function)
    }
}
