//! Recording side: proxies that forward to a live subject while appending
//! descriptors to the record store.

pub mod proxy;

pub use proxy::RecordingProxy;

use std::sync::Arc;

use crate::callstack::{Stack, StackFilter};

/// Context shared by every proxy of one recording session.
#[derive(Debug)]
pub struct RecordCtx {
    pub stack: Stack,
    pub filter: StackFilter,
}

impl RecordCtx {
    pub fn new(filter: StackFilter) -> Arc<Self> {
        Arc::new(Self {
            stack: Stack::new(),
            filter,
        })
    }
}
