//! Named service registry.
//!
//! Storage backends, authentication and logging sinks are external
//! collaborators; handlers and hooks reach them through this registry via
//! [`Context`](crate::Context) instead of global state.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A name-keyed, type-erased collection of shared services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a service under `name`, replacing any previous service of
    /// the same name.
    pub fn add_service<T: Send + Sync + 'static>(&self, name: impl Into<String>, service: T) {
        self.services.write().insert(name.into(), Arc::new(service));
    }

    /// Chaining form of [`add_service`](Self::add_service) for registry
    /// construction.
    #[must_use]
    pub fn with_service<T: Send + Sync + 'static>(self, name: impl Into<String>, service: T) -> Self {
        self.add_service(name, service);
        self
    }

    /// Looks up a service by name, downcast to `T`. Returns `None` when the
    /// name is unknown or registered under a different type.
    pub fn get_service<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let service = self.services.read().get(name).cloned()?;
        service.downcast::<T>().ok()
    }

    /// Whether a service is registered under `name`.
    pub fn has_service(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }
}
