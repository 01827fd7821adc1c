//! Record/replay proxy layer for testing code that depends on a live,
//! hard-to-automate external API.
//!
//! During a live session every observable interaction with the API is
//! recorded into a portable JSON document; later the same interaction
//! surface is satisfied from that document alone, with nondeterministic
//! elements (memory addresses, instance identity, call ordering) reconciled
//! by a heuristic matching engine.

pub mod callstack;
pub mod error;
pub mod intercept;
pub mod normalize;
pub mod proxy;
pub mod record;
pub mod replay;
pub mod session;
pub mod store;
pub mod subject;
pub mod value;

pub use callstack::{Frame, Stack, StackFilter, StackScope};
pub use error::{Error, Result};
pub use intercept::{Interceptor, ManagedModules, ModuleLoader, RawModule, Resolved};
pub use normalize::Normalizer;
pub use proxy::{ApiObject, ApiValue};
pub use record::RecordingProxy;
pub use replay::{MatchWeights, ReplayProxy};
pub use session::{Mode, RecordSession, ReplaySession, SessionConfig};
pub use store::{CallDescriptor, RecordCell, RecordNode, RecordStore, ValueType};
pub use subject::{
    ApiException, Arg, Args, AttrValue, Callback, InstanceArg, Subject, SubjectError, SubjectKind,
};
pub use value::Value;
