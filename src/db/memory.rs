//! In-memory savepoint adapter.
//!
//! Keeps a stack of named savepoints and a journal of every primitive call.
//! Failures can be injected one call at a time, which is all the REPL and
//! the tests need to drive the interceptor through its failure paths.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::savepoint::{Primitive, PrimitiveError, SavepointAdapter};

/// One primitive call recorded by [`MemoryAdapter`].
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub operation: Primitive,
    /// Savepoint the call targeted, if one was open.
    pub savepoint: Option<String>,
    pub succeeded: bool,
    pub at: DateTime<Utc>,
}

/// Savepoint stack held in memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    savepoints: Vec<String>,
    journal: Vec<JournalEntry>,
    fail_release: Option<String>,
    fail_rollback: Option<String>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a savepoint on top of the stack.
    pub fn create_savepoint(&mut self, name: impl Into<String>) {
        self.savepoints.push(name.into());
    }

    /// Open savepoints, outermost first.
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Innermost open savepoint.
    pub fn current(&self) -> Option<&str> {
        self.savepoints.last().map(String::as_str)
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Make the next release fail with `message`.
    pub fn fail_next_release(&mut self, message: impl Into<String>) {
        self.fail_release = Some(message.into());
    }

    /// Make the next rollback-to fail with `message`.
    pub fn fail_next_rollback(&mut self, message: impl Into<String>) {
        self.fail_rollback = Some(message.into());
    }

    fn pop(&mut self, operation: Primitive) -> Result<String, PrimitiveError> {
        let injected = match operation {
            Primitive::Release => self.fail_release.take(),
            Primitive::RollbackTo => self.fail_rollback.take(),
        };

        let result = match injected {
            Some(message) => Err(PrimitiveError::new(operation, message)),
            None => self
                .savepoints
                .pop()
                .ok_or_else(|| PrimitiveError::new(operation, "no savepoint is open")),
        };

        self.journal.push(JournalEntry {
            operation,
            savepoint: match &result {
                Ok(name) => Some(name.clone()),
                Err(_) => self.current().map(str::to_string),
            },
            succeeded: result.is_ok(),
            at: Utc::now(),
        });
        result
    }
}

impl SavepointAdapter for MemoryAdapter {
    /// Name of the savepoint that was resolved.
    type Output = String;

    fn release_savepoint(&mut self) -> Result<String, PrimitiveError> {
        self.pop(Primitive::Release)
    }

    fn rollback_to_savepoint(&mut self) -> Result<String, PrimitiveError> {
        self.pop(Primitive::RollbackTo)
    }

    fn adapter_name(&self) -> &'static str {
        "memory"
    }
}
