//! Heuristic matching of replay requests against recorded descriptors.
//!
//! Every candidate recorded under the requested name is scored; lower is
//! better and 0 is an exact match. The weights are tuned policy, not law,
//! so they live in a config struct with the historical defaults.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::callstack::Frame;
use crate::error::{Error, Result};
use crate::normalize::Normalizer;
use crate::store::CallDescriptor;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
pub struct MatchWeights {
    pub name_mismatch: u64,
    pub arg_mismatch: u64,
    pub kwarg_mismatch: u64,
    /// Multiplier on |current − recorded| call index distance.
    pub call_index: u64,
    pub frame_file: u64,
    pub frame_function: u64,
    /// Multiplier on per-frame |line delta|.
    pub frame_line: u64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            name_mismatch: 100,
            arg_mismatch: 10,
            kwarg_mismatch: 10,
            call_index: 5,
            frame_file: 100,
            frame_function: 100,
            frame_line: 1,
        }
    }
}

/// A replay-side call or instantiation to reconcile against the records.
#[derive(Debug)]
pub struct MatchRequest<'a> {
    pub name: &'a str,
    pub args: &'a [Value],
    pub kwargs: &'a BTreeMap<String, Value>,
    pub callstack: &'a [Frame],
    pub call_index: u64,
}

pub fn score(
    weights: &MatchWeights,
    normalizer: &Normalizer,
    request: &MatchRequest<'_>,
    desc: &CallDescriptor,
) -> u64 {
    let mut s = 0u64;

    if request.name != desc.name {
        s += weights.name_mismatch;
    }

    for (a, b) in request.args.iter().zip(desc.args.iter()) {
        if normalizer.clean_value(a) != normalizer.clean_value(b) {
            s += weights.arg_mismatch;
        }
    }

    for ((ka, va), (kb, vb)) in request.kwargs.iter().zip(desc.kwargs.iter()) {
        if ka != kb || normalizer.clean_value(va) != normalizer.clean_value(vb) {
            s += weights.kwarg_mismatch;
        }
    }

    s += weights.call_index * request.call_index.abs_diff(desc.call_index);

    // Stacks pair up to the shorter length.
    for (a, b) in request.callstack.iter().zip(desc.callstack.iter()) {
        if a.file != b.file {
            s += weights.frame_file;
        }
        if a.function != b.function {
            s += weights.frame_function;
        }
        s += weights.frame_line * u64::from(a.line.abs_diff(b.line));
    }

    s
}

/// Pick the minimum-score candidate (stable on ties). A nonzero minimum or
/// multiple distinct minima degrade match quality and are logged, never
/// fatal; an empty candidate set is a hard failure.
pub fn select_best(name: &str, scores: &[u64]) -> Result<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (idx, &s) in scores.iter().enumerate() {
        match best {
            Some((_, min)) if s >= min => {}
            _ => best = Some((idx, s)),
        }
    }

    let (idx, min) = best.ok_or_else(|| Error::NoCandidates {
        name: name.to_string(),
    })?;

    if min != 0 {
        warn!(%name, score = min, "non-zero best match score");
    }
    let tied = scores.iter().filter(|&&s| s == min).count();
    if tied > 1 {
        warn!(%name, tied, score = min, "multiple best-score candidates");
    }
    info!(%name, index = idx, score = min, candidates = scores.len(), "selected match");

    Ok(idx)
}
