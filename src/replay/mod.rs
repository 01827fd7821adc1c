//! Replay side: proxies that answer the recorded interaction surface from
//! data alone, with no live subject present.

pub mod exception;
pub mod matching;
pub mod proxy;

pub use matching::MatchWeights;
pub use proxy::ReplayProxy;

use std::sync::Arc;

use crate::callstack::{Stack, StackFilter};
use crate::normalize::Normalizer;

/// Context shared by every proxy of one replay session.
#[derive(Debug)]
pub struct ReplayCtx {
    pub stack: Stack,
    pub filter: StackFilter,
    pub weights: MatchWeights,
    pub normalizer: Normalizer,
}

impl ReplayCtx {
    pub fn new(filter: StackFilter, weights: MatchWeights) -> Arc<Self> {
        Arc::new(Self {
            stack: Stack::new(),
            filter,
            weights,
            normalizer: Normalizer::default(),
        })
    }
}
