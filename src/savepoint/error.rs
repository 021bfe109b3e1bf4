//! Savepoint interception error types.

use std::fmt;

use thiserror::Error;

use crate::hooks::{HookError, HookFailure};

/// Result type for intercepted savepoint operations.
pub type SavepointResult<T> = Result<T, SavepointError>;

/// The two primitive operations the host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Release,
    RollbackTo,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Release => write!(f, "release savepoint"),
            Primitive::RollbackTo => write!(f, "rollback to savepoint"),
        }
    }
}

/// A release or rollback-to primitive failed in the host adapter.
#[derive(Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct PrimitiveError {
    /// Which primitive failed.
    pub operation: Primitive,
    /// Adapter-supplied description.
    pub message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PrimitiveError {
    pub fn new(operation: Primitive, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// A failed release.
    pub fn release(message: impl Into<String>) -> Self {
        Self::new(Primitive::Release, message)
    }

    /// A failed rollback-to.
    pub fn rollback_to(message: impl Into<String>) -> Self {
        Self::new(Primitive::RollbackTo, message)
    }

    /// Attach the driver-level cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Errors surfaced by the savepoint interceptor.
#[derive(Debug, Error)]
pub enum SavepointError {
    /// The underlying release or rollback-to call failed.
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),

    /// An application hook failed.
    #[error(transparent)]
    Hook(#[from] HookFailure),

    /// Depth bookkeeping is corrupt. Always a bug in this layer.
    #[error("savepoint invariant violated: {0}")]
    InvariantViolation(String),
}

impl SavepointError {
    /// Check if this error indicates a bug rather than a runtime failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SavepointError::InvariantViolation(_))
    }

    /// Create an invariant violation.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

/// Lets a hook that resolves a nested savepoint use `?` on the result.
impl From<SavepointError> for HookError {
    fn from(err: SavepointError) -> Self {
        HookError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookKind;

    #[test]
    fn test_error_fatal() {
        let violation = SavepointError::invariant("depth underflow");
        assert!(violation.is_fatal());

        let primitive = SavepointError::from(PrimitiveError::release("connection lost"));
        assert!(!primitive.is_fatal());
    }

    #[test]
    fn test_wrapped_errors_keep_their_message() {
        let primitive = SavepointError::from(PrimitiveError::rollback_to("no such savepoint"));
        assert_eq!(
            primitive.to_string(),
            "rollback to savepoint failed: no such savepoint"
        );

        let hook = SavepointError::from(HookFailure {
            kind: HookKind::AfterCommit,
            name: "mailer".into(),
            source: HookError::new("smtp down"),
        });
        assert_eq!(hook.to_string(), "smtp down");
    }

    #[test]
    fn test_primitive_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let err = PrimitiveError::release("driver error").with_source(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "socket closed");
    }
}
