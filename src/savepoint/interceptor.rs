//! Savepoint interceptor - fires lifecycle hooks around savepoint boundaries.
//!
//! The interceptor wraps a [`SavepointAdapter`] and is the only entry point
//! the host should call for releases and rollbacks. A release is treated as
//! a commit:
//!
//! ```text
//! Idle → Entered → HooksBeforeFired → Delegated → HooksAfterFired ─┐
//!                     │                   │                          ├→ CleanedUp → Idle
//!                     └──────── Failed ◄──┘──────────────────────────┘
//! ```
//!
//! A rollback-to is treated as a rollback, unless a release already
//! committed the current scope, in which case it does nothing at all.
//!
//! Entering a boundary takes the pending hooks out of the interceptor, so
//! hooks fire with the interceptor itself as their context and may resolve
//! nested savepoints through it. A nested boundary only sees hooks
//! registered after its parent entered.

use std::mem;

use tracing::{debug, error, warn};

use crate::hooks::{HookError, HookFailure, HookKind, HookRegistry};
use crate::savepoint::adapter::SavepointAdapter;
use crate::savepoint::config::InterceptorConfig;
use crate::savepoint::depth::DepthTracker;
use crate::savepoint::error::{Primitive, SavepointResult};

/// Hooks as stored by an interceptor over `A`.
pub type InterceptorHooks<A> = HookRegistry<SavepointInterceptor<A>>;

/// Decorator that adds commit/rollback hook semantics to an adapter.
pub struct SavepointInterceptor<A> {
    adapter: A,
    state: DepthTracker,
    hooks: InterceptorHooks<A>,
    config: InterceptorConfig,
}

impl<A: SavepointAdapter> SavepointInterceptor<A> {
    /// Wrap an adapter with the default configuration.
    pub fn new(adapter: A) -> Self {
        Self::with_config(adapter, InterceptorConfig::default())
    }

    /// Wrap an adapter with a custom configuration.
    pub fn with_config(adapter: A, config: InterceptorConfig) -> Self {
        Self {
            adapter,
            state: DepthTracker::new(),
            hooks: HookRegistry::new(),
            config,
        }
    }

    /// Get a reference to the wrapped adapter.
    pub fn inner(&self) -> &A {
        &self.adapter
    }

    /// Get a mutable reference to the wrapped adapter.
    ///
    /// Calling the raw primitives through this bypasses every hook.
    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Unwrap, returning the adapter.
    pub fn into_inner(self) -> A {
        self.adapter
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Connection state: depth and scope flags.
    pub fn state(&self) -> &DepthTracker {
        &self.state
    }

    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    /// Hooks waiting for the next boundary. Inside a hook this is only what
    /// was registered since the enclosing boundary entered.
    pub fn hooks(&self) -> &InterceptorHooks<A> {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut InterceptorHooks<A> {
        &mut self.hooks
    }

    /// Register a hook for the current unit of work.
    pub fn register_hook<F>(&mut self, kind: HookKind, name: impl Into<String>, mut callback: F)
    where
        A: 'static,
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.hooks.register(kind, name, move |_: &mut Self| callback());
    }

    /// Register a hook that is handed this interceptor when it fires.
    ///
    /// The hook may release or roll back nested savepoints; they run as
    /// boundaries of their own one level deeper.
    pub fn register_hook_with<F>(&mut self, kind: HookKind, name: impl Into<String>, callback: F)
    where
        F: FnMut(&mut Self) -> Result<(), HookError> + Send + 'static,
    {
        self.hooks.register(kind, name, callback);
    }

    /// Start a new top-level scope, re-enabling rollbacks.
    pub fn begin_scope(&mut self) {
        self.state.begin_scope();
    }

    /// Drop per-boundary transient state. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if self.config.clear_hooks_on_cleanup {
            self.hooks.clear();
        }
    }

    pub(crate) fn reset_state(&mut self) {
        self.state.reset();
        self.hooks.clear();
    }

    /// Release the innermost savepoint, firing commit hooks around it.
    ///
    /// Before-commit hooks always fire once the release is attempted.
    /// After-commit hooks fire only if the primitive succeeded. Any hook or
    /// primitive failure is returned as-is after cleanup.
    pub fn release_savepoint(&mut self) -> SavepointResult<A::Output> {
        let suppress_rollback = self.config.suppress_rollback_after_release;

        let mut boundary = Boundary::enter(self, Primitive::Release);
        let outcome = boundary.release(suppress_rollback);

        let mut early = Ok(());
        if let Err(err) = &outcome {
            warn!(connection = %boundary.label, error = %err, "savepoint release failed");
            // Settle the decrement here so the failure path and the exit
            // path cannot both count it.
            let state = &mut boundary.interceptor.state;
            if !state.is_rollback_suppressed() {
                early = state.exit_early();
            }
        }

        boundary.settle(outcome, early)
    }

    /// Roll back to the innermost savepoint, firing rollback hooks around it.
    ///
    /// Returns `Ok(None)` without touching the adapter, the hooks, or the
    /// depth when a release already committed the current scope.
    pub fn rollback_to_savepoint(&mut self) -> SavepointResult<Option<A::Output>> {
        if self.state.is_rollback_suppressed() {
            debug!(
                connection = self.config.label_or(self.adapter.adapter_name()),
                "rollback suppressed, scope already committed"
            );
            return Ok(None);
        }

        let mut boundary = Boundary::enter(self, Primitive::RollbackTo);
        let outcome = boundary.rollback();
        if let Err(err) = &outcome {
            warn!(connection = %boundary.label, error = %err, "savepoint rollback failed");
        }

        boundary.settle(outcome, Ok(())).map(Some)
    }
}

impl<A: SavepointAdapter> std::fmt::Debug for SavepointInterceptor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavepointInterceptor")
            .field("adapter", &self.adapter.adapter_name())
            .field("state", &self.state)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// One in-flight savepoint call.
///
/// Entering bumps the depth and takes ownership of the pending hooks.
/// Cleanup and the exit decrement run in [`settle`](Boundary::settle), or in
/// `Drop` if a hook or primitive panics.
struct Boundary<'a, A: SavepointAdapter> {
    interceptor: &'a mut SavepointInterceptor<A>,
    pending: InterceptorHooks<A>,
    label: String,
    primitive: Primitive,
    finished: bool,
}

impl<'a, A: SavepointAdapter> Boundary<'a, A> {
    fn enter(interceptor: &'a mut SavepointInterceptor<A>, primitive: Primitive) -> Self {
        let label = interceptor
            .config
            .label_or(interceptor.adapter.adapter_name())
            .to_string();
        interceptor.state.enter();
        let pending = mem::take(&mut interceptor.hooks);
        debug!(
            connection = %label,
            depth = interceptor.state.depth(),
            hooks = pending.total(),
            "entering {}",
            primitive
        );

        Self {
            interceptor,
            pending,
            label,
            primitive,
            finished: false,
        }
    }

    fn fire(&mut self, kinds: &[HookKind]) -> Result<usize, HookFailure> {
        self.pending.fire_all(self.interceptor, kinds)
    }

    fn release(&mut self, suppress_rollback: bool) -> SavepointResult<A::Output> {
        self.fire(&HookKind::BEFORE_COMMIT)?;

        let output = self.interceptor.adapter.release_savepoint()?;
        if suppress_rollback {
            self.interceptor.state.suppress_rollback();
        }

        self.fire(&HookKind::AFTER_COMMIT)?;
        Ok(output)
    }

    fn rollback(&mut self) -> SavepointResult<A::Output> {
        self.fire(&HookKind::BEFORE_ROLLBACK)?;
        let output = self.interceptor.adapter.rollback_to_savepoint()?;
        self.fire(&HookKind::AFTER_ROLLBACK)?;
        Ok(output)
    }

    /// Close the boundary and combine the operation's outcome with its exit
    /// bookkeeping.
    ///
    /// The caller always sees the operation's own failure; a bookkeeping
    /// violation only replaces a success.
    fn settle<T>(
        mut self,
        outcome: SavepointResult<T>,
        early: SavepointResult<()>,
    ) -> SavepointResult<T> {
        self.finished = true;
        let exited = self.close();
        match early.and(exited) {
            Ok(()) => outcome,
            Err(violation) => {
                error!(connection = %self.label, error = %violation, "savepoint depth bookkeeping failed");
                outcome.and(Err(violation))
            }
        }
    }

    fn close(&mut self) -> SavepointResult<()> {
        let pending = mem::take(&mut self.pending);
        if !self.interceptor.config.clear_hooks_on_cleanup {
            self.interceptor.hooks.restore(pending);
        }
        self.interceptor.cleanup();

        let exited = self.interceptor.state.exit();
        debug!(
            connection = %self.label,
            depth = self.interceptor.state.depth(),
            "left {}",
            self.primitive
        );
        exited
    }
}

impl<A: SavepointAdapter> Drop for Boundary<'_, A> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Unwinding out of a hook or the primitive.
        if let Err(violation) = self.close() {
            error!(connection = %self.label, error = %violation, "savepoint depth bookkeeping failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::hooks::HookError;
    use crate::savepoint::error::{PrimitiveError, SavepointError};

    type Log = Arc<Mutex<Vec<String>>>;

    struct ScriptedAdapter {
        log: Log,
        fail_release: bool,
        fail_rollback: bool,
    }

    impl ScriptedAdapter {
        fn new(log: &Log) -> Self {
            Self {
                log: log.clone(),
                fail_release: false,
                fail_rollback: false,
            }
        }
    }

    impl SavepointAdapter for ScriptedAdapter {
        type Output = &'static str;

        fn release_savepoint(&mut self) -> Result<Self::Output, PrimitiveError> {
            self.log.lock().unwrap().push("release".into());
            if self.fail_release {
                return Err(PrimitiveError::release("disk full"));
            }
            Ok("released")
        }

        fn rollback_to_savepoint(&mut self) -> Result<Self::Output, PrimitiveError> {
            self.log.lock().unwrap().push("rollback".into());
            if self.fail_rollback {
                return Err(PrimitiveError::rollback_to("savepoint missing"));
            }
            Ok("rolled back")
        }
    }

    fn setup() -> (Log, SavepointInterceptor<ScriptedAdapter>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let interceptor = SavepointInterceptor::new(ScriptedAdapter::new(&log));
        (log, interceptor)
    }

    fn record(log: &Log, entry: &str) -> impl FnMut() -> Result<(), HookError> + Send + 'static {
        let log = log.clone();
        let entry = entry.to_string();
        move || {
            log.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn register_all(interceptor: &mut SavepointInterceptor<ScriptedAdapter>, log: &Log) {
        // Registered in reverse so ordering comes from the kind, not insertion.
        for kind in HookKind::ALL.iter().rev() {
            interceptor.register_hook(*kind, kind.as_str(), record(log, kind.as_str()));
        }
    }

    #[test]
    fn test_release_fires_commit_hooks_once() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::BeforeCommit, "before", record(&log, "before"));
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));
        assert_eq!(interceptor.depth(), 0);

        let output = interceptor.release_savepoint().unwrap();

        assert_eq!(output, "released");
        assert_eq!(interceptor.depth(), 0);
        assert_eq!(entries(&log), vec!["before", "release", "after"]);
        assert!(interceptor.state().is_rollback_suppressed());
    }

    #[test]
    fn test_release_commit_hook_order() {
        let (log, mut interceptor) = setup();
        register_all(&mut interceptor, &log);

        interceptor.release_savepoint().unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "before_commit",
                "before_commit_on_create",
                "before_commit_on_update",
                "before_commit_on_save",
                "before_commit_on_destroy",
                "release",
                "after_commit",
                "after_commit_on_create",
                "after_commit_on_update",
                "after_commit_on_save",
                "after_commit_on_destroy",
            ]
        );
    }

    #[test]
    fn test_release_primitive_failure_skips_after_hooks() {
        let (log, mut interceptor) = setup();
        interceptor.inner_mut().fail_release = true;
        interceptor.register_hook(HookKind::BeforeCommit, "before", record(&log, "before"));
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));

        let err = interceptor.release_savepoint().unwrap_err();

        match err {
            SavepointError::Primitive(primitive) => {
                assert_eq!(primitive.operation, Primitive::Release);
                assert_eq!(primitive.message, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(entries(&log), vec!["before", "release"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(!interceptor.state().is_rollback_suppressed());
        assert!(!interceptor.state().is_handled());
    }

    #[test]
    fn test_release_before_hook_failure_skips_primitive() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::BeforeCommitOnUpdate, "guard", || {
            Err(HookError::new("stale record"))
        });
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));

        let err = interceptor.release_savepoint().unwrap_err();

        match err {
            SavepointError::Hook(failure) => {
                assert_eq!(failure.kind, HookKind::BeforeCommitOnUpdate);
                assert_eq!(failure.name, "guard");
                assert_eq!(failure.hook_error(), &HookError::new("stale record"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(entries(&log).is_empty());
        assert_eq!(interceptor.depth(), 0);
    }

    #[test]
    fn test_release_after_hook_failure_still_commits() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::AfterCommit, "mailer", || {
            Err(HookError::new("smtp down"))
        });
        interceptor.register_hook(HookKind::AfterCommitOnSave, "late", record(&log, "late"));

        let err = interceptor.release_savepoint().unwrap_err();

        assert_eq!(err.to_string(), "smtp down");
        assert_eq!(entries(&log), vec!["release"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.state().is_rollback_suppressed());
    }

    #[test]
    fn test_rollback_after_release_is_noop() {
        let (log, mut interceptor) = setup();
        interceptor.release_savepoint().unwrap();
        log.lock().unwrap().clear();
        register_all(&mut interceptor, &log);

        let output = interceptor.rollback_to_savepoint().unwrap();

        assert!(output.is_none());
        assert!(entries(&log).is_empty());
        assert_eq!(interceptor.depth(), 0);
        // Nothing resolved, so the hooks are still pending.
        assert_eq!(interceptor.hooks().total(), HookKind::ALL.len());
    }

    #[test]
    fn test_rollback_fires_rollback_hooks() {
        let (log, mut interceptor) = setup();
        register_all(&mut interceptor, &log);

        let output = interceptor.rollback_to_savepoint().unwrap();

        assert_eq!(output, Some("rolled back"));
        assert_eq!(entries(&log), vec!["before_rollback", "rollback", "after_rollback"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.hooks().is_empty());
    }

    #[test]
    fn test_rollback_failure_propagates_after_cleanup() {
        let (log, mut interceptor) = setup();
        interceptor.inner_mut().fail_rollback = true;
        register_all(&mut interceptor, &log);

        let err = interceptor.rollback_to_savepoint().unwrap_err();

        assert_eq!(err.to_string(), "rollback to savepoint failed: savepoint missing");
        assert_eq!(entries(&log), vec!["before_rollback", "rollback"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.hooks().is_empty());
    }

    #[test]
    fn test_rollback_before_hook_failure_skips_primitive() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::BeforeRollback, "guard", || {
            Err(HookError::new("nope"))
        });
        interceptor.register_hook(HookKind::AfterRollback, "after", record(&log, "after"));

        let err = interceptor.rollback_to_savepoint().unwrap_err();

        match err {
            SavepointError::Hook(failure) => {
                assert_eq!(failure.kind, HookKind::BeforeRollback);
                assert_eq!(failure.name, "guard");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(entries(&log).is_empty());
        assert_eq!(interceptor.depth(), 0);
        assert!(!interceptor.state().is_handled());
        assert!(interceptor.hooks().is_empty());
    }

    #[test]
    fn test_cleanup_clears_hooks_even_on_failure() {
        let (log, mut interceptor) = setup();
        interceptor.inner_mut().fail_release = true;
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));

        interceptor.release_savepoint().unwrap_err();
        assert!(interceptor.hooks().is_empty());

        // A later successful release does not see the stale hook.
        interceptor.inner_mut().fail_release = false;
        interceptor.release_savepoint().unwrap();
        assert_eq!(entries(&log), vec!["release", "release"]);
    }

    #[test]
    fn test_hooks_kept_when_clearing_disabled() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = InterceptorConfig::new().clear_hooks_on_cleanup(false);
        let mut interceptor = SavepointInterceptor::with_config(ScriptedAdapter::new(&log), config);
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));

        interceptor.release_savepoint().unwrap();
        interceptor.release_savepoint().unwrap();

        assert_eq!(entries(&log), vec!["release", "after", "release", "after"]);
    }

    #[test]
    fn test_rollback_allowed_without_suppression() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = InterceptorConfig::new().suppress_rollback_after_release(false);
        let mut interceptor = SavepointInterceptor::with_config(ScriptedAdapter::new(&log), config);

        interceptor.release_savepoint().unwrap();
        assert_eq!(interceptor.rollback_to_savepoint().unwrap(), Some("rolled back"));
        assert_eq!(entries(&log), vec!["release", "rollback"]);
    }

    #[test]
    fn test_begin_scope_reenables_rollback() {
        let (log, mut interceptor) = setup();
        interceptor.release_savepoint().unwrap();
        assert_eq!(interceptor.rollback_to_savepoint().unwrap(), None);

        interceptor.begin_scope();
        assert_eq!(interceptor.rollback_to_savepoint().unwrap(), Some("rolled back"));
        assert_eq!(entries(&log), vec!["release", "rollback"]);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::AfterCommit, "after", record(&log, "after"));
        interceptor.cleanup();
        interceptor.cleanup();
        assert!(interceptor.hooks().is_empty());
        assert_eq!(interceptor.depth(), 0);
    }

    #[test]
    fn test_panicking_hook_still_balances_depth() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook(HookKind::BeforeCommit, "explode", || -> Result<(), HookError> {
            panic!("hook exploded")
        });

        let result = catch_unwind(AssertUnwindSafe(|| interceptor.release_savepoint()));

        assert!(result.is_err());
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.hooks().is_empty());
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn test_boxed_adapter() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let adapter: Box<dyn SavepointAdapter<Output = &'static str>> =
            Box::new(ScriptedAdapter::new(&log));
        let mut interceptor = SavepointInterceptor::new(adapter);

        assert_eq!(interceptor.release_savepoint().unwrap(), "released");
        assert_eq!(entries(&log), vec!["release"]);
    }

    #[test]
    fn test_hook_releases_nested_savepoint() {
        let (log, mut interceptor) = setup();
        let depths = Arc::new(Mutex::new(Vec::new()));
        let audits = Arc::new(Mutex::new(0));
        interceptor.register_hook(HookKind::BeforeCommit, "outer", record(&log, "outer"));

        let seen = depths.clone();
        let count = audits.clone();
        let inner_log = log.clone();
        interceptor.register_hook_with(HookKind::AfterCommitOnCreate, "save_audit", move |ic| {
            seen.lock().unwrap().push(ic.depth());
            *count.lock().unwrap() += 1;

            // Saving the audit row opens and releases a savepoint of its own.
            let seen = seen.clone();
            ic.register_hook_with(HookKind::AfterCommit, "audit_indexed", move |ic| {
                seen.lock().unwrap().push(ic.depth());
                Ok(())
            });
            ic.register_hook(HookKind::BeforeCommit, "inner", record(&inner_log, "inner"));
            ic.release_savepoint()?;
            Ok(())
        });

        interceptor.release_savepoint().unwrap();

        assert_eq!(*depths.lock().unwrap(), vec![1, 2]);
        assert_eq!(entries(&log), vec!["outer", "release", "inner", "release"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.hooks().is_empty());

        // Every boundary's hooks were consumed exactly once.
        interceptor.begin_scope();
        interceptor.release_savepoint().unwrap();
        assert_eq!(*audits.lock().unwrap(), 1);
        assert_eq!(depths.lock().unwrap().len(), 2);
        assert_eq!(
            entries(&log),
            vec!["outer", "release", "inner", "release", "release"]
        );
    }

    #[test]
    fn test_nested_failure_surfaces_through_outer_hook() {
        let (log, mut interceptor) = setup();
        interceptor.register_hook_with(HookKind::AfterCommit, "save_audit", |ic| {
            ic.inner_mut().fail_release = true;
            ic.release_savepoint()?;
            Ok(())
        });
        interceptor.register_hook(HookKind::AfterCommitOnSave, "late", record(&log, "late"));

        let err = interceptor.release_savepoint().unwrap_err();

        match err {
            SavepointError::Hook(failure) => {
                assert_eq!(failure.name, "save_audit");
                assert_eq!(failure.to_string(), "release savepoint failed: disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(entries(&log), vec!["release", "release"]);
        assert_eq!(interceptor.depth(), 0);
        assert!(!interceptor.state().is_handled());
        assert!(interceptor.hooks().is_empty());
    }

    #[test]
    fn test_hook_rolls_back_nested_savepoint() {
        let (log, mut interceptor) = setup();
        let depth_inside = Arc::new(Mutex::new(None));
        let seen = depth_inside.clone();
        interceptor.register_hook_with(HookKind::BeforeRollback, "undo_child", move |ic| {
            ic.register_hook_with(HookKind::AfterRollback, "child_undone", {
                let seen = seen.clone();
                move |ic| {
                    *seen.lock().unwrap() = Some(ic.depth());
                    Ok(())
                }
            });
            ic.rollback_to_savepoint()?;
            Ok(())
        });

        assert_eq!(interceptor.rollback_to_savepoint().unwrap(), Some("rolled back"));

        assert_eq!(*depth_inside.lock().unwrap(), Some(2));
        assert_eq!(entries(&log), vec!["rollback", "rollback"]);
        assert_eq!(interceptor.depth(), 0);
    }

    #[test]
    fn test_nested_panic_balances_every_level() {
        let (_log, mut interceptor) = setup();
        interceptor.register_hook_with(HookKind::AfterCommit, "save_audit", |ic| {
            ic.register_hook(HookKind::BeforeCommit, "explode", || -> Result<(), HookError> {
                panic!("hook exploded")
            });
            ic.release_savepoint()?;
            Ok(())
        });

        let result = catch_unwind(AssertUnwindSafe(|| interceptor.release_savepoint()));

        assert!(result.is_err());
        assert_eq!(interceptor.depth(), 0);
        assert!(interceptor.hooks().is_empty());
    }

    #[test]
    fn test_depth_balanced_across_random_interleavings() {
        let (log, mut interceptor) = setup();
        let mut rng = StdRng::seed_from_u64(0x5a5e);
        let max_depth = Arc::new(Mutex::new(0));

        for step in 0..500 {
            interceptor.inner_mut().fail_release = rng.gen_bool(0.3);
            interceptor.inner_mut().fail_rollback = rng.gen_bool(0.3);
            if rng.gen_bool(0.2) {
                interceptor.register_hook(HookKind::BeforeCommit, "flaky", || {
                    Err(HookError::new("flaky"))
                });
            }
            if rng.gen_bool(0.2) {
                interceptor.register_hook(HookKind::AfterRollback, "flaky", || {
                    Err(HookError::new("flaky"))
                });
            }
            if rng.gen_bool(0.3) {
                let kind = if rng.gen_bool(0.5) {
                    HookKind::AfterCommitOnSave
                } else {
                    HookKind::BeforeRollback
                };
                let nested_release = rng.gen_bool(0.5);
                let max_depth = max_depth.clone();
                interceptor.register_hook_with(kind, "nested", move |ic| {
                    for inner in [HookKind::BeforeCommit, HookKind::BeforeRollback] {
                        let max_depth = max_depth.clone();
                        ic.register_hook_with(inner, "observe", move |ic| {
                            let mut max = max_depth.lock().unwrap();
                            *max = (*max).max(ic.depth());
                            Ok(())
                        });
                    }
                    if nested_release {
                        ic.release_savepoint()?;
                    } else {
                        ic.rollback_to_savepoint()?;
                    }
                    Ok(())
                });
            }
            if rng.gen_bool(0.1) {
                interceptor.begin_scope();
            }

            let before = interceptor.depth();
            let result = if rng.gen_bool(0.5) {
                interceptor.release_savepoint().map(|_| ())
            } else {
                interceptor.rollback_to_savepoint().map(|_| ())
            };

            if let Err(err) = result {
                assert!(!err.is_fatal(), "step {step}: {err}");
            }
            assert_eq!(interceptor.depth(), before, "step {step}");
            assert!(!interceptor.state().is_handled(), "step {step}");
        }
        assert!(!entries(&log).is_empty());
        assert!(*max_depth.lock().unwrap() >= 2);
    }
}
