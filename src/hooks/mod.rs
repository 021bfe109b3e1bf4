//! Lifecycle hooks fired around commit and rollback boundaries.
//!
//! Application code registers callbacks on a [`HookRegistry`] while it works
//! inside a unit of work. When a savepoint boundary resolves, the interceptor
//! fires them in a fixed order:
//!
//! ```text
//! release:   before_commit → on_create → on_update → on_save → on_destroy
//!            (primitive)
//!            after_commit  → on_create → on_update → on_save → on_destroy
//!
//! rollback:  before_rollback → (primitive) → after_rollback
//! ```

mod error;
mod kind;
mod registry;

pub use error::{HookError, HookFailure};
pub use kind::{HookKind, Operation, Phase};
pub use registry::{HookFn, HookRegistry};
