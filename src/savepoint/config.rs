//! Interceptor configuration.

/// Interceptor configuration options.
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Turn later rollbacks in the same scope into no-ops once a release
    /// has succeeded.
    pub suppress_rollback_after_release: bool,
    /// Clear the hook registry whenever a boundary resolves.
    pub clear_hooks_on_cleanup: bool,
    /// Name used for this connection in log events.
    pub label: Option<String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            suppress_rollback_after_release: true,
            clear_hooks_on_cleanup: true,
            label: None,
        }
    }
}

impl InterceptorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set suppress_rollback_after_release flag.
    pub fn suppress_rollback_after_release(mut self, value: bool) -> Self {
        self.suppress_rollback_after_release = value;
        self
    }

    /// Set clear_hooks_on_cleanup flag.
    pub fn clear_hooks_on_cleanup(mut self, value: bool) -> Self {
        self.clear_hooks_on_cleanup = value;
        self
    }

    /// Set the log label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn label_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(fallback)
    }
}
