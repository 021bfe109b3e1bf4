//! Ordered hook registry.
//!
//! Hooks are stored per [`HookKind`] in insertion order. Each hook is handed
//! a mutable context when it fires; for the savepoint interceptor that is
//! the interceptor itself, so a hook can open and resolve nested savepoints
//! on the same connection. Whatever else a hook touches belongs to whoever
//! registered it.

use std::collections::BTreeMap;
use std::fmt;

use crate::hooks::error::{HookError, HookFailure};
use crate::hooks::kind::HookKind;

/// A boxed hook callback receiving a `C` context.
pub type HookFn<C> = Box<dyn FnMut(&mut C) -> Result<(), HookError> + Send>;

struct Hook<C> {
    name: String,
    callback: HookFn<C>,
}

/// Lifecycle hooks for one connection's current unit of work.
pub struct HookRegistry<C> {
    hooks: BTreeMap<HookKind, Vec<Hook<C>>>,
}

impl<C> Default for HookRegistry<C> {
    fn default() -> Self {
        Self {
            hooks: BTreeMap::new(),
        }
    }
}

impl<C> HookRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook under `kind`. Hooks of the same kind fire in the
    /// order they were registered.
    pub fn register<F>(&mut self, kind: HookKind, name: impl Into<String>, callback: F)
    where
        F: FnMut(&mut C) -> Result<(), HookError> + Send + 'static,
    {
        self.hooks.entry(kind).or_default().push(Hook {
            name: name.into(),
            callback: Box::new(callback),
        });
    }

    /// Number of hooks registered under `kind`.
    pub fn len(&self, kind: HookKind) -> usize {
        self.hooks.get(&kind).map_or(0, Vec::len)
    }

    /// Number of hooks across all kinds.
    pub fn total(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Names registered under `kind`, in firing order.
    pub fn names(&self, kind: HookKind) -> Vec<&str> {
        self.hooks
            .get(&kind)
            .map(|hooks| hooks.iter().map(|h| h.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Fire every hook of each kind in `kinds`, kind by kind.
    ///
    /// Stops at the first failing hook; hooks after it are not invoked.
    /// Returns how many hooks ran successfully.
    pub fn fire_all(&mut self, context: &mut C, kinds: &[HookKind]) -> Result<usize, HookFailure> {
        let mut fired = 0;
        for kind in kinds {
            fired += self.fire(context, *kind)?;
        }
        Ok(fired)
    }

    fn fire(&mut self, context: &mut C, kind: HookKind) -> Result<usize, HookFailure> {
        let Some(hooks) = self.hooks.get_mut(&kind) else {
            return Ok(0);
        };

        let mut fired = 0;
        for hook in hooks.iter_mut() {
            (hook.callback)(context).map_err(|source| HookFailure {
                kind,
                name: hook.name.clone(),
                source,
            })?;
            fired += 1;
        }
        Ok(fired)
    }

    /// Put `earlier` back in front of whatever was registered after it was
    /// taken out, keeping per-kind insertion order.
    pub fn restore(&mut self, earlier: HookRegistry<C>) {
        for (kind, mut hooks) in earlier.hooks {
            if let Some(later) = self.hooks.remove(&kind) {
                hooks.extend(later);
            }
            self.hooks.insert(kind, hooks);
        }
    }

    /// Drop every registered hook.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl<C> fmt::Debug for HookRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, hooks) in &self.hooks {
            map.entry(kind, &hooks.len());
        }
        map.finish()
    }
}
