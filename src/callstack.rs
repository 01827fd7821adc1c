//! Caller-stack capture used as a similarity signal during matching.
//!
//! Rust has no runtime stack introspection, so the stack is explicit: test
//! code opens [`StackScope`]s (cheap RAII guards capturing file/line via
//! `#[track_caller]`), and proxies snapshot the scope stack at each call.
//! Frames are never used for control flow, only to score match candidates.

use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            source: None,
        }
    }

    pub fn from_location(loc: &Location<'_>, function: impl Into<String>) -> Self {
        Self::new(loc.file(), loc.line(), function)
    }
}

/// Policy for truncating and filtering captured stacks before they are
/// recorded or matched. Frames belonging to the test-dispatch machinery end
/// the stack; frames from harness internals are dropped.
#[derive(Debug, Clone)]
pub struct StackFilter {
    /// A frame whose function starts with one of these prefixes terminates
    /// the capture (everything above it is dispatch machinery).
    pub stop_function_prefixes: Vec<String>,
    /// Frames whose file path contains one of these fragments are skipped.
    pub skip_file_fragments: Vec<String>,
}

impl Default for StackFilter {
    fn default() -> Self {
        Self {
            stop_function_prefixes: vec!["harness_".to_string()],
            skip_file_fragments: vec!["/reprox/src/".to_string()],
        }
    }
}

impl StackFilter {
    pub fn apply(&self, frames: &[Frame]) -> Vec<Frame> {
        let mut kept = Vec::new();
        for frame in frames {
            if self
                .stop_function_prefixes
                .iter()
                .any(|p| frame.function.starts_with(p.as_str()))
            {
                break;
            }
            if self
                .skip_file_fragments
                .iter()
                .any(|f| frame.file.contains(f.as_str()))
            {
                continue;
            }
            kept.push(frame.clone());
        }
        kept
    }
}

/// The session's current explicit stack, innermost frame last. Shared by all
/// proxies of one session; single-threaded by contract.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a named frame for the duration of the returned guard.
    #[track_caller]
    pub fn scope(&self, function: &str) -> StackScope {
        let frame = Frame::from_location(Location::caller(), function);
        self.frames.lock().push(frame);
        StackScope {
            frames: Arc::clone(&self.frames),
        }
    }

    /// Snapshot the stack innermost-first, optionally with an extra
    /// innermost frame (the proxy call site), filtered by `filter`.
    pub fn capture(&self, innermost: Option<Frame>, filter: &StackFilter) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();
        if let Some(frame) = innermost {
            frames.push(frame);
        }
        frames.extend(self.frames.lock().iter().rev().cloned());
        filter.apply(&frames)
    }
}

pub struct StackScope {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl Drop for StackScope {
    fn drop(&mut self) {
        self.frames.lock().pop();
    }
}
