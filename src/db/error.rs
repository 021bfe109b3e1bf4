//! Connection and REPL error types.

use thiserror::Error;

use crate::savepoint::SavepointError;

/// Result type for connection-level operations.
pub type DbResult<T> = Result<T, DbError>;

/// Connection and REPL errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Savepoint(#[from] SavepointError),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0}")]
    UnknownHookKind(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// The savepoint error, if this wraps one.
    pub fn as_savepoint(&self) -> Option<&SavepointError> {
        match self {
            DbError::Savepoint(err) => Some(err),
            _ => None,
        }
    }
}
