//! Savepoint interception.
//!
//! When every unit of work runs inside one outer transaction (typical for
//! test harnesses that roll everything back), nested "transactions" are
//! really savepoints, and commit hooks would never fire. This module treats
//! each savepoint release as a commit and each rollback-to as a rollback,
//! firing the matching lifecycle hooks exactly once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    InterceptorRegistry                      │
//! │        (which adapter variants are intercepted, once)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ attach
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SavepointInterceptor<A>                    │
//! │   release_savepoint / rollback_to_savepoint + cleanup       │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   Depth     │       │    Hook     │       │  Savepoint  │
//!  │  Tracker    │       │  Registry   │       │  Adapter A  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use aftercommit::hooks::HookKind;
//! use aftercommit::savepoint::InterceptorRegistry;
//!
//! let mut conn = InterceptorRegistry::global().attach(adapter);
//! conn.register_hook(HookKind::AfterCommit, "mailer", || Ok(()));
//! conn.register_hook_with(HookKind::AfterCommitOnCreate, "audit", |conn| {
//!     conn.inner_mut().create_savepoint("audit");
//!     conn.release_savepoint()?;  // nested boundary, depth 2
//!     Ok(())
//! });
//!
//! conn.release_savepoint()?;      // fires before/after commit hooks
//! conn.rollback_to_savepoint()?;  // no-op: the scope already committed
//! ```

mod adapter;
mod config;
mod depth;
mod error;
mod install;
mod interceptor;

pub use adapter::SavepointAdapter;
pub use config::InterceptorConfig;
pub use depth::DepthTracker;
pub use error::{Primitive, PrimitiveError, SavepointError, SavepointResult};
pub use install::{AdapterVariant, InterceptorRegistry};
pub use interceptor::{InterceptorHooks, SavepointInterceptor};
