//! Intercepted connections.
//!
//! A [`Connection`] owns one adapter wrapped in a [`SavepointInterceptor`],
//! plus the bookkeeping a host needs around it: an id, when it was opened,
//! and counters for the boundaries it resolved. Its state lives exactly as
//! long as the connection, or until [`reset`](Connection::reset).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use crate::hooks::{HookError, HookKind, Operation};
use crate::savepoint::{
    InterceptorConfig, InterceptorHooks, InterceptorRegistry, SavepointAdapter, SavepointError,
    SavepointInterceptor, SavepointResult,
};

/// A host connection with savepoint interception installed.
pub struct Connection<A: SavepointAdapter> {
    id: String,
    opened_at: DateTime<Utc>,
    interceptor: SavepointInterceptor<A>,
    counters: Counters,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    scopes: u64,
    releases: u64,
    rollbacks: u64,
    suppressed_rollbacks: u64,
    failures: u64,
}

impl<A: SavepointAdapter + 'static> Connection<A> {
    /// Open a connection over `adapter`, installing interception for its
    /// type in `registry` if it is not installed yet.
    pub fn open(adapter: A, registry: &InterceptorRegistry, config: InterceptorConfig) -> Self {
        let interceptor = registry.attach_with_config(adapter, config);
        let id = Ulid::new().to_string().to_lowercase();
        debug!(connection = %id, adapter = interceptor.inner().adapter_name(), "connection opened");

        Self {
            id,
            opened_at: Utc::now(),
            interceptor,
            counters: Counters::default(),
        }
    }

    /// Open a connection using the process-wide registry and defaults.
    pub fn with_defaults(adapter: A) -> Self {
        Self::open(adapter, InterceptorRegistry::global(), InterceptorConfig::default())
    }

    /// Register a before-commit hook, optionally scoped to one operation.
    pub fn before_commit<F>(&mut self, operation: Option<Operation>, name: &str, callback: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor
            .register_hook(HookKind::before_commit(operation), name, callback);
    }

    /// Register an after-commit hook, optionally scoped to one operation.
    pub fn after_commit<F>(&mut self, operation: Option<Operation>, name: &str, callback: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor
            .register_hook(HookKind::after_commit(operation), name, callback);
    }

    pub fn before_rollback<F>(&mut self, name: &str, callback: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor
            .register_hook(HookKind::BeforeRollback, name, callback);
    }

    pub fn after_rollback<F>(&mut self, name: &str, callback: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor
            .register_hook(HookKind::AfterRollback, name, callback);
    }

    /// Register a hook of any kind.
    pub fn register_hook<F>(&mut self, kind: HookKind, name: &str, callback: F)
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor.register_hook(kind, name, callback);
    }

    /// Register a hook that is handed the interceptor when it fires, so it
    /// can resolve nested savepoints on this connection.
    ///
    /// Nested calls made this way go straight through the interceptor and
    /// are not reflected in this connection's counters.
    pub fn register_hook_with<F>(&mut self, kind: HookKind, name: &str, callback: F)
    where
        F: FnMut(&mut SavepointInterceptor<A>) -> Result<(), HookError> + Send + 'static,
    {
        self.interceptor.register_hook_with(kind, name, callback);
    }
}

impl<A: SavepointAdapter> Connection<A> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn adapter(&self) -> &A {
        self.interceptor.inner()
    }

    /// Mutable access to the raw adapter. Calls made through it fire no hooks.
    pub fn adapter_mut(&mut self) -> &mut A {
        self.interceptor.inner_mut()
    }

    pub fn interceptor(&self) -> &SavepointInterceptor<A> {
        &self.interceptor
    }

    pub fn hooks(&self) -> &InterceptorHooks<A> {
        self.interceptor.hooks()
    }

    pub fn depth(&self) -> usize {
        self.interceptor.depth()
    }

    /// Start a new top-level scope on this connection.
    pub fn begin_scope(&mut self) {
        self.interceptor.begin_scope();
        self.counters.scopes += 1;
        debug!(connection = %self.id, scope = self.counters.scopes, "scope started");
    }

    /// Release the innermost savepoint through the interceptor.
    pub fn release_savepoint(&mut self) -> SavepointResult<A::Output> {
        let result = self.interceptor.release_savepoint();
        match &result {
            Ok(_) => self.counters.releases += 1,
            Err(_) => self.counters.failures += 1,
        }
        result
    }

    /// Roll back to the innermost savepoint through the interceptor.
    pub fn rollback_to_savepoint(&mut self) -> SavepointResult<Option<A::Output>> {
        let result = self.interceptor.rollback_to_savepoint();
        match &result {
            Ok(Some(_)) => self.counters.rollbacks += 1,
            Ok(None) => self.counters.suppressed_rollbacks += 1,
            Err(_) => self.counters.failures += 1,
        }
        result
    }

    /// Discard connection state between logical transactions.
    ///
    /// Fails if a savepoint call is somehow still in flight.
    pub fn reset(&mut self) -> SavepointResult<()> {
        let depth = self.interceptor.depth();
        if depth != 0 {
            return Err(SavepointError::invariant(format!(
                "connection reset at depth {}",
                depth
            )));
        }
        self.interceptor.reset_state();
        self.counters = Counters::default();
        debug!(connection = %self.id, "connection state reset");
        Ok(())
    }

    /// Close the connection, handing back the raw adapter.
    pub fn close(self) -> A {
        debug!(connection = %self.id, "connection closed");
        self.interceptor.into_inner()
    }

    /// Snapshot of this connection's state.
    pub fn info(&self) -> ConnectionInfo {
        let state = self.interceptor.state();
        ConnectionInfo {
            id: self.id.clone(),
            adapter: self.interceptor.inner().adapter_name(),
            opened_at: self.opened_at,
            depth: state.depth(),
            rollback_suppressed: state.is_rollback_suppressed(),
            pending_hooks: self.interceptor.hooks().total(),
            scopes: self.counters.scopes,
            releases: self.counters.releases,
            rollbacks: self.counters.rollbacks,
            suppressed_rollbacks: self.counters.suppressed_rollbacks,
            failures: self.counters.failures,
        }
    }
}

impl<A: SavepointAdapter> std::fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("interceptor", &self.interceptor)
            .finish()
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub adapter: &'static str,
    pub opened_at: DateTime<Utc>,
    pub depth: usize,
    pub rollback_suppressed: bool,
    /// Hooks registered and not yet consumed by a boundary.
    pub pending_hooks: usize,
    pub scopes: u64,
    pub releases: u64,
    pub rollbacks: u64,
    pub suppressed_rollbacks: u64,
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::db::memory::MemoryAdapter;

    fn setup() -> (InterceptorRegistry, Connection<MemoryAdapter>) {
        let registry = InterceptorRegistry::new();
        let conn = Connection::open(MemoryAdapter::new(), &registry, InterceptorConfig::default());
        (registry, conn)
    }

    #[test]
    fn test_open_installs_adapter_once() {
        let (registry, _conn) = setup();
        let _second = Connection::open(MemoryAdapter::new(), &registry, InterceptorConfig::default());
        assert_eq!(registry.len(), 1);
        assert!(registry.is_installed::<MemoryAdapter>());
    }

    #[test]
    fn test_unit_of_work_commit() {
        let (_registry, mut conn) = setup();
        let events = Arc::new(Mutex::new(Vec::new()));

        conn.begin_scope();
        conn.adapter_mut().create_savepoint("test_case");
        conn.adapter_mut().create_savepoint("active_record_1");

        let e = events.clone();
        conn.after_commit(Some(Operation::Create), "index_user", move || {
            e.lock().unwrap().push("indexed");
            Ok(())
        });
        let e = events.clone();
        conn.before_commit(None, "validate", move || {
            e.lock().unwrap().push("validated");
            Ok(())
        });

        assert_eq!(conn.release_savepoint().unwrap(), "active_record_1");
        assert_eq!(*events.lock().unwrap(), vec!["validated", "indexed"]);

        // The harness rolls the test back; the scope already committed.
        assert_eq!(conn.rollback_to_savepoint().unwrap(), None);
        assert_eq!(conn.adapter().current(), Some("test_case"));

        let info = conn.info();
        assert_eq!(info.depth, 0);
        assert_eq!(info.releases, 1);
        assert_eq!(info.suppressed_rollbacks, 1);
        assert_eq!(info.pending_hooks, 0);
        assert_eq!(info.adapter, "memory");
    }

    #[test]
    fn test_unit_of_work_rollback() {
        let (_registry, mut conn) = setup();
        let events = Arc::new(Mutex::new(Vec::new()));
        conn.adapter_mut().create_savepoint("sp1");

        let e = events.clone();
        conn.after_rollback("restore_cache", move || {
            e.lock().unwrap().push("restored");
            Ok(())
        });
        let e = events.clone();
        conn.after_commit(None, "never", move || {
            e.lock().unwrap().push("committed");
            Ok(())
        });

        assert_eq!(conn.rollback_to_savepoint().unwrap().as_deref(), Some("sp1"));
        assert_eq!(*events.lock().unwrap(), vec!["restored"]);
        assert_eq!(conn.info().rollbacks, 1);
    }

    #[test]
    fn test_after_commit_hook_saves_nested_record() {
        let (_registry, mut conn) = setup();
        let depths = Arc::new(Mutex::new(Vec::new()));
        conn.begin_scope();
        conn.adapter_mut().create_savepoint("test_case");
        conn.adapter_mut().create_savepoint("active_record_1");

        let seen = depths.clone();
        conn.register_hook_with(HookKind::AfterCommitOnCreate, "write_audit", move |ic| {
            seen.lock().unwrap().push(ic.depth());
            ic.inner_mut().create_savepoint("active_record_2");
            let released = ic.release_savepoint()?;
            seen.lock().unwrap().push(ic.depth());
            assert_eq!(released, "active_record_2");
            Ok(())
        });

        assert_eq!(conn.release_savepoint().unwrap(), "active_record_1");

        assert_eq!(*depths.lock().unwrap(), vec![1, 1]);
        assert_eq!(conn.depth(), 0);
        assert_eq!(conn.adapter().savepoints(), ["test_case".to_string()]);
        assert_eq!(conn.adapter().journal().len(), 2);
        assert_eq!(conn.rollback_to_savepoint().unwrap(), None);
        assert_eq!(conn.info().releases, 1);
    }

    #[test]
    fn test_failures_counted() {
        let (_registry, mut conn) = setup();
        conn.adapter_mut().create_savepoint("sp1");
        conn.adapter_mut().fail_next_release("connection reset by peer");

        let err = conn.release_savepoint().unwrap_err();
        assert_eq!(err.to_string(), "release savepoint failed: connection reset by peer");

        assert_eq!(conn.release_savepoint().unwrap(), "sp1");

        assert_eq!(conn.info().failures, 1);
        assert_eq!(conn.depth(), 0);
    }

    #[test]
    fn test_reset_clears_state() {
        let (_registry, mut conn) = setup();
        conn.adapter_mut().create_savepoint("sp1");
        conn.release_savepoint().unwrap();
        conn.after_commit(None, "pending", || Ok(()));

        conn.reset().unwrap();

        let info = conn.info();
        assert!(!info.rollback_suppressed);
        assert_eq!(info.pending_hooks, 0);
        assert_eq!(info.releases, 0);
    }

    #[test]
    fn test_close_returns_adapter() {
        let (_registry, mut conn) = setup();
        conn.adapter_mut().create_savepoint("sp1");
        conn.release_savepoint().unwrap();

        let adapter = conn.close();
        assert_eq!(adapter.journal().len(), 1);
    }

    #[test]
    fn test_info_serializes() {
        let (_registry, conn) = setup();
        let json = serde_json::to_value(conn.info()).unwrap();
        assert_eq!(json["depth"], 0);
        assert_eq!(json["adapter"], "memory");
        assert_eq!(json["id"].as_str().unwrap().len(), 26);
    }
}
