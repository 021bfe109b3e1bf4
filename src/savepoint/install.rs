//! Installation registry - records which adapter variants are intercepted.
//!
//! Installation is per adapter *type* and idempotent: installing the same
//! variant twice records it once, so hooks are never attached twice.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::savepoint::adapter::SavepointAdapter;
use crate::savepoint::config::InterceptorConfig;
use crate::savepoint::interceptor::SavepointInterceptor;

/// An adapter variant the interceptor has been installed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterVariant {
    /// Fully qualified type name of the adapter.
    pub name: &'static str,
    /// When it was first installed.
    pub installed_at: DateTime<Utc>,
    type_id: TypeId,
}

/// Tracks adapter variants with interception installed.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    installed: Arc<RwLock<Vec<AdapterVariant>>>,
}

impl InterceptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static InterceptorRegistry {
        static GLOBAL: OnceLock<InterceptorRegistry> = OnceLock::new();
        GLOBAL.get_or_init(InterceptorRegistry::new)
    }

    /// Install interception on adapter type `A`.
    ///
    /// Returns `true` if this call installed it, `false` if it was already
    /// installed.
    pub fn install<A: SavepointAdapter + 'static>(&self) -> bool {
        let type_id = TypeId::of::<A>();
        let mut installed = self.installed.write();
        if installed.iter().any(|v| v.type_id == type_id) {
            return false;
        }

        let name = std::any::type_name::<A>();
        installed.push(AdapterVariant {
            name,
            installed_at: Utc::now(),
            type_id,
        });
        info!(adapter = name, "savepoint interception installed");
        true
    }

    /// Check whether adapter type `A` is intercepted.
    pub fn is_installed<A: SavepointAdapter + 'static>(&self) -> bool {
        let type_id = TypeId::of::<A>();
        self.installed.read().iter().any(|v| v.type_id == type_id)
    }

    /// Installed variants, in installation order.
    pub fn installed(&self) -> Vec<AdapterVariant> {
        self.installed.read().clone()
    }

    /// Number of installed variants.
    pub fn len(&self) -> usize {
        self.installed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.read().is_empty()
    }

    /// Install (if needed) and wrap `adapter` with the default configuration.
    pub fn attach<A: SavepointAdapter + 'static>(&self, adapter: A) -> SavepointInterceptor<A> {
        self.attach_with_config(adapter, InterceptorConfig::default())
    }

    /// Install (if needed) and wrap `adapter`.
    pub fn attach_with_config<A: SavepointAdapter + 'static>(
        &self,
        adapter: A,
        config: InterceptorConfig,
    ) -> SavepointInterceptor<A> {
        self.install::<A>();
        SavepointInterceptor::with_config(adapter, config)
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.installed.read().iter().map(|v| v.name).collect();
        f.debug_struct("InterceptorRegistry")
            .field("installed", &names)
            .finish()
    }
}
