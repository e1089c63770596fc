use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the mixed query engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The document store could not be read or the index could not be written.
    #[error("index build failed at {path}: {reason}")]
    IndexBuild { path: PathBuf, reason: String },

    /// The published index exists but cannot be loaded.
    #[error("index at {path} is unreadable: {reason}")]
    IndexRead { path: PathBuf, reason: String },

    #[error("document store error at {path}: {source}")]
    DocumentStore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed text query at byte {offset}: {reason}")]
    TextQueryParse { offset: usize, reason: String },

    #[error("relational query `{clause}` failed: {source}")]
    RelationalExecution {
        clause: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key injection could not find a safe place in the relational clause.
    #[error("cannot project key `{key}`: {reason}")]
    RewriteAmbiguity { key: String, reason: String },

    #[error("operator is not initialized")]
    NotInitialized,

    #[error("operator is closed")]
    Closed,

    #[error("query deadline exceeded during {phase}")]
    DeadlineExceeded { phase: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn relational<E>(clause: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EngineError::RelationalExecution { clause: clause.to_string(), source: Box::new(source) }
    }

    /// True for errors caused by the caller's query text rather than the engine's state.
    pub fn is_query_error(&self) -> bool {
        matches!(self, EngineError::TextQueryParse { .. } | EngineError::RewriteAmbiguity { .. })
    }
}
