//! Hook trigger kinds and their firing order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The CRUD operation a scoped hook is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Save,
    Destroy,
}

impl Operation {
    /// All operations, in firing order.
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Update,
        Operation::Save,
        Operation::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Save => "save",
            Operation::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The boundary a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeCommit,
    AfterCommit,
    BeforeRollback,
    AfterRollback,
}

/// A lifecycle hook trigger.
///
/// Commit hooks come in a general flavour and one flavour per [`Operation`];
/// rollback hooks are general only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    BeforeCommit,
    BeforeCommitOnCreate,
    BeforeCommitOnUpdate,
    BeforeCommitOnSave,
    BeforeCommitOnDestroy,
    AfterCommit,
    AfterCommitOnCreate,
    AfterCommitOnUpdate,
    AfterCommitOnSave,
    AfterCommitOnDestroy,
    BeforeRollback,
    AfterRollback,
}

impl HookKind {
    /// Every trigger kind.
    pub const ALL: [HookKind; 12] = [
        HookKind::BeforeCommit,
        HookKind::BeforeCommitOnCreate,
        HookKind::BeforeCommitOnUpdate,
        HookKind::BeforeCommitOnSave,
        HookKind::BeforeCommitOnDestroy,
        HookKind::AfterCommit,
        HookKind::AfterCommitOnCreate,
        HookKind::AfterCommitOnUpdate,
        HookKind::AfterCommitOnSave,
        HookKind::AfterCommitOnDestroy,
        HookKind::BeforeRollback,
        HookKind::AfterRollback,
    ];

    /// Firing order before a savepoint release.
    pub const BEFORE_COMMIT: [HookKind; 5] = [
        HookKind::BeforeCommit,
        HookKind::BeforeCommitOnCreate,
        HookKind::BeforeCommitOnUpdate,
        HookKind::BeforeCommitOnSave,
        HookKind::BeforeCommitOnDestroy,
    ];

    /// Firing order after a successful savepoint release.
    pub const AFTER_COMMIT: [HookKind; 5] = [
        HookKind::AfterCommit,
        HookKind::AfterCommitOnCreate,
        HookKind::AfterCommitOnUpdate,
        HookKind::AfterCommitOnSave,
        HookKind::AfterCommitOnDestroy,
    ];

    pub const BEFORE_ROLLBACK: [HookKind; 1] = [HookKind::BeforeRollback];

    pub const AFTER_ROLLBACK: [HookKind; 1] = [HookKind::AfterRollback];

    /// The before-commit kind for an optional operation scope.
    pub fn before_commit(operation: Option<Operation>) -> Self {
        match operation {
            None => HookKind::BeforeCommit,
            Some(Operation::Create) => HookKind::BeforeCommitOnCreate,
            Some(Operation::Update) => HookKind::BeforeCommitOnUpdate,
            Some(Operation::Save) => HookKind::BeforeCommitOnSave,
            Some(Operation::Destroy) => HookKind::BeforeCommitOnDestroy,
        }
    }

    /// The after-commit kind for an optional operation scope.
    pub fn after_commit(operation: Option<Operation>) -> Self {
        match operation {
            None => HookKind::AfterCommit,
            Some(Operation::Create) => HookKind::AfterCommitOnCreate,
            Some(Operation::Update) => HookKind::AfterCommitOnUpdate,
            Some(Operation::Save) => HookKind::AfterCommitOnSave,
            Some(Operation::Destroy) => HookKind::AfterCommitOnDestroy,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            HookKind::BeforeCommit
            | HookKind::BeforeCommitOnCreate
            | HookKind::BeforeCommitOnUpdate
            | HookKind::BeforeCommitOnSave
            | HookKind::BeforeCommitOnDestroy => Phase::BeforeCommit,
            HookKind::AfterCommit
            | HookKind::AfterCommitOnCreate
            | HookKind::AfterCommitOnUpdate
            | HookKind::AfterCommitOnSave
            | HookKind::AfterCommitOnDestroy => Phase::AfterCommit,
            HookKind::BeforeRollback => Phase::BeforeRollback,
            HookKind::AfterRollback => Phase::AfterRollback,
        }
    }

    /// The operation this kind is scoped to, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            HookKind::BeforeCommitOnCreate | HookKind::AfterCommitOnCreate => {
                Some(Operation::Create)
            }
            HookKind::BeforeCommitOnUpdate | HookKind::AfterCommitOnUpdate => {
                Some(Operation::Update)
            }
            HookKind::BeforeCommitOnSave | HookKind::AfterCommitOnSave => Some(Operation::Save),
            HookKind::BeforeCommitOnDestroy | HookKind::AfterCommitOnDestroy => {
                Some(Operation::Destroy)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::BeforeCommit => "before_commit",
            HookKind::BeforeCommitOnCreate => "before_commit_on_create",
            HookKind::BeforeCommitOnUpdate => "before_commit_on_update",
            HookKind::BeforeCommitOnSave => "before_commit_on_save",
            HookKind::BeforeCommitOnDestroy => "before_commit_on_destroy",
            HookKind::AfterCommit => "after_commit",
            HookKind::AfterCommitOnCreate => "after_commit_on_create",
            HookKind::AfterCommitOnUpdate => "after_commit_on_update",
            HookKind::AfterCommitOnSave => "after_commit_on_save",
            HookKind::AfterCommitOnDestroy => "after_commit_on_destroy",
            HookKind::BeforeRollback => "before_rollback",
            HookKind::AfterRollback => "after_rollback",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a hook kind from its snake_case name.
impl std::str::FromStr for HookKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        HookKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown hook kind: {}", s))
    }
}
