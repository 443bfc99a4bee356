//! Error taxonomy for the engine's public boundary.
//!
//! Internally, pipeline stages use `anyhow::Error` for ad hoc context
//! (the same mix the teacher's own crates use), but every error that
//! crosses `Engine::query`/`execute`/`explain` is converted to an
//! [`EngineError`] variant, so callers can match on error *kind* per
//! spec.md §7.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub reason: String,
    pub position: Option<usize>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} (at position {pos})", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), position: None }
    }

    pub fn at(reason: impl Into<String>, position: usize) -> Self {
        Self { reason: reason.into(), position: Some(position) }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("optimizer error: {0}")]
    Optimizer(String),

    #[error("sql error executing {sql:?}: {source}")]
    Sql {
        source: anyhow::Error,
        sql: String,
    },

    #[error("security error: {0}")]
    Security(String),

    #[error("query timed out")]
    Timeout,

    #[error("query was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Marker trait macro used by `EngineError::bad_request`-style call sites
/// is unnecessary here; the teacher's `bad_request!`/`internal!` macros are
/// kept as plain constructors since `EngineError` is a closed enum rather
/// than a single struct with an `ErrorKind` tag.
impl EngineError {
    pub fn metadata(msg: impl Into<String>) -> Self {
        EngineError::Metadata(msg.into())
    }

    pub fn optimizer(msg: impl Into<String>) -> Self {
        EngineError::Optimizer(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        EngineError::Security(msg.into())
    }

    pub fn sql(source: anyhow::Error, sql: impl Into<String>) -> Self {
        EngineError::Sql { source, sql: sql.into() }
    }
}
