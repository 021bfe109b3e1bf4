//! Per-connection depth bookkeeping.
//!
//! The interceptor bumps the depth when a release or rollback-to starts and
//! drops it again when the call finishes. A failing release may settle the
//! decrement early; `decrement_handled` tells the normal exit path that the
//! work is already done so the decrement happens exactly once per call.

use crate::savepoint::error::{SavepointError, SavepointResult};

/// Depth counter and flags for a single connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthTracker {
    depth: usize,
    rollback_suppressed: bool,
    decrement_handled: bool,
}

impl DepthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Start a savepoint-scoped call.
    pub fn enter(&mut self) {
        self.depth += 1;
        self.decrement_handled = false;
    }

    /// Finish a savepoint-scoped call.
    ///
    /// No-op if the decrement was already settled through
    /// [`exit_early`](Self::exit_early) during this call.
    pub fn exit(&mut self) -> SavepointResult<()> {
        if self.decrement_handled {
            self.decrement_handled = false;
            return Ok(());
        }
        self.decrement()
    }

    /// Settle the decrement now and mark it handled for the coming
    /// [`exit`](Self::exit).
    ///
    /// This is the only way to mark a decrement handled; callers cannot
    /// skip one without paying for it:
    ///
    /// ```compile_fail
    /// let mut tracker = aftercommit::savepoint::DepthTracker::new();
    /// tracker.enter();
    /// tracker.mark_handled();
    /// ```
    pub fn exit_early(&mut self) -> SavepointResult<()> {
        if self.decrement_handled {
            return Err(SavepointError::invariant(
                "depth decrement attempted twice in one call",
            ));
        }
        self.decrement()?;
        self.mark_handled();
        Ok(())
    }

    fn mark_handled(&mut self) {
        self.decrement_handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.decrement_handled
    }

    /// Record that the current scope has logically committed; later
    /// rollbacks in the same scope become no-ops.
    pub fn suppress_rollback(&mut self) {
        self.rollback_suppressed = true;
    }

    pub fn is_rollback_suppressed(&self) -> bool {
        self.rollback_suppressed
    }

    /// Start a new top-level scope.
    pub fn begin_scope(&mut self) {
        self.rollback_suppressed = false;
    }

    /// Forget everything, as for a freshly opened connection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn decrement(&mut self) -> SavepointResult<()> {
        self.depth = self.depth.checked_sub(1).ok_or_else(|| {
            SavepointError::invariant("depth would drop below zero")
        })?;
        Ok(())
    }
}
