//! Application-level handle on a backend registry
//!
//! Most programs use [`Context::new`], which shares one lazily built,
//! process-wide registry with the built-in backends already registered.
//! Tests and embedders that want isolation build their own registry and
//! wrap it with [`Context::with_registry`].

use crate::backends;
use crate::registry::BackendRegistry;
use log::debug;
use once_cell::sync::Lazy;
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<Arc<BackendRegistry>> = Lazy::new(|| {
    let registry = BackendRegistry::new();
    backends::register_builtin(&registry);
    debug!("Global registry ready with {} backends", registry.len());
    Arc::new(registry)
});

/// The process-wide registry
pub fn global_registry() -> Arc<BackendRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

/// Cheap, cloneable reference to a registry
///
/// Dropping a context never drops backend instances: cached instances
/// belong to whoever still holds them.
#[derive(Clone, Debug)]
pub struct Context {
    registry: Arc<BackendRegistry>,
}

impl Context {
    /// Context over the shared process-wide registry
    pub fn new() -> Self {
        Self {
            registry: global_registry(),
        }
    }

    pub fn with_registry(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_share_global_registry() {
        let a = Context::new();
        let b = Context::default();
        assert!(std::ptr::eq(a.registry(), b.registry()));
        assert_eq!(a.registry().list(), b.registry().list());
    }

    #[test]
    fn test_private_registry() {
        let ctx = Context::with_registry(Arc::new(BackendRegistry::new()));
        assert!(ctx.registry().is_empty());
    }
}
