//! Hook error types.

use thiserror::Error;

use crate::hooks::kind::HookKind;

/// Error raised by an application-registered hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A hook failed while a boundary was firing hooks.
///
/// Carries the hook's own error untouched; `Display` shows only that error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source}")]
pub struct HookFailure {
    /// Trigger kind that was firing.
    pub kind: HookKind,
    /// Name the hook was registered under.
    pub name: String,
    /// The error the hook returned.
    pub source: HookError,
}

impl HookFailure {
    /// The error exactly as the hook raised it.
    pub fn hook_error(&self) -> &HookError {
        &self.source
    }
}
