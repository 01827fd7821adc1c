use thiserror::Error;

use crate::store::ValueType;
use crate::subject::{ApiException, SubjectError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("value type mismatch for `{name}`: recorded as {existing:?}, re-registered as {requested:?}")]
    ValueTypeMismatch {
        name: String,
        existing: ValueType,
        requested: ValueType,
    },
    #[error("no record for `{name}` on `{object}`")]
    MissingRecord { object: String, name: String },
    #[error("no recorded candidates for `{name}`")]
    NoCandidates { name: String },
    #[error("module `{0}` cannot be resolved")]
    MissingModule(String),
    #[error("reentrancy guard corrupted while resolving `{0}`")]
    ReentrantResolve(String),
    #[error("`{0}` is not callable")]
    NotCallable(String),
    #[error("record session already finished")]
    SessionFinished,
    /// An exception raised by the live subject, or reconstructed from a
    /// record; identical class name and message in both modes.
    #[error("{0}")]
    Raised(ApiException),
    #[error("subject error: {0}")]
    Subject(SubjectError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Load(#[from] anyhow::Error),
}

impl Error {
    /// Raised API exceptions keep their own variant so they propagate
    /// unchanged; everything else from a subject is a subject error.
    pub fn from_subject(err: SubjectError) -> Self {
        match err {
            SubjectError::Raised(ex) => Error::Raised(ex),
            other => Error::Subject(other),
        }
    }

    pub fn raised(&self) -> Option<&ApiException> {
        match self {
            Error::Raised(ex) => Some(ex),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
