//! Host-side connection API and REPL interface.
//!
//! This module provides the per-connection wrapper a host persistence layer
//! holds, an in-memory adapter for driving it, and an interactive
//! command-line interface on top.

mod connection;
mod error;
mod memory;
mod repl;

pub use connection::{Connection, ConnectionInfo};
pub use error::{DbError, DbResult};
pub use memory::{JournalEntry, MemoryAdapter};
pub use repl::{Command, Repl, ReplConfig};
