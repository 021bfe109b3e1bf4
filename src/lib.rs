//! aftercommit - commit and rollback hooks for savepoint-emulated transactions
//!
//! Test harnesses often wrap every test in one outer transaction and roll it
//! back at the end, so nested "transactions" inside the code under test are
//! really savepoints and commit hooks never fire. This crate intercepts
//! savepoint releases and rollbacks and fires the lifecycle hooks a real
//! top-level commit or rollback would, exactly once and in order.
//!
//! # Example
//!
//! ```no_run
//! use aftercommit::db::{Connection, MemoryAdapter};
//!
//! let mut conn = Connection::with_defaults(MemoryAdapter::new());
//! conn.adapter_mut().create_savepoint("test_case");
//! conn.after_commit(None, "send_welcome_email", || Ok(()));
//!
//! conn.release_savepoint().unwrap();     // fires the after-commit hook
//! conn.rollback_to_savepoint().unwrap(); // no-op: already committed
//! ```

pub mod db;
pub mod hooks;
pub mod savepoint;
