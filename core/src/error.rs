use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("failed to load corpus from {path}: {reason}")]
    CorpusLoad { path: PathBuf, reason: String },

    /// The query shares no term with the fitted vocabulary.
    #[error("query has no lexical signal")]
    NoLexicalSignal,

    #[error("invalid job id: {0}")]
    InvalidIdentifier(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cached artifacts are stale: expected hash {expected}, found {found}")]
    CacheMismatch { expected: String, found: String },

    #[error("scoring failed: {0}")]
    UnexpectedScoringFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Serialization(err.to_string())
    }
}
