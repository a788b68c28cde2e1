// Dependency injection container

use crate::{Error, Provider};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A type-erased singleton held by the container.
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

struct Registration {
    name: &'static str,
    instance: SharedInstance,
}

/// The dependency injection container.
///
/// Holds one singleton per concrete type. Cloning the container is cheap and
/// every clone sees the same registrations.
#[derive(Clone)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Registration>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a provider instance
    pub fn register<T: Provider>(&self, instance: T) -> Arc<T> {
        let shared = Arc::new(instance);
        self.register_shared(shared.clone());
        shared
    }

    /// Register an already shared provider instance
    pub fn register_shared<T: Provider>(&self, instance: Arc<T>) {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Acquiring write lock for registration");
        self.providers.write().insert(
            TypeId::of::<T>(),
            Registration {
                name: type_name,
                instance,
            },
        );

        debug!(provider = type_name, "Provider registered in DI container");
    }

    /// Register a provider using a factory that can resolve its own dependencies
    pub fn register_factory<T: Provider, F>(&self, factory: F) -> Result<Arc<T>, Error>
    where
        F: FnOnce(&Container) -> Result<T, Error>,
    {
        let type_name = std::any::type_name::<T>();
        debug!(provider = type_name, "Creating provider from factory");

        let instance = factory(self)?;
        Ok(self.register(instance))
    }

    /// Resolve a provider by type
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Attempting to resolve provider");
        let result = self
            .resolve_by_id(TypeId::of::<T>())
            .and_then(|any| any.downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(type_name.to_string()));

        match &result {
            Ok(_) => debug!(provider = type_name, "Provider resolved successfully"),
            Err(_) => debug!(provider = type_name, "Provider not found in container"),
        }

        result
    }

    /// Resolve a provider by TypeId, without knowing its static type
    pub fn resolve_by_id(&self, type_id: TypeId) -> Option<SharedInstance> {
        self.providers
            .read()
            .get(&type_id)
            .map(|registration| registration.instance.clone())
    }

    /// Check if a provider is registered
    pub fn has<T: Provider>(&self) -> bool {
        self.has_id(TypeId::of::<T>())
    }

    /// Check if a provider is registered by TypeId
    pub fn has_id(&self, type_id: TypeId) -> bool {
        let exists = self.providers.read().contains_key(&type_id);
        trace!(type_id = ?type_id, exists = exists, "Checked provider existence");
        exists
    }

    /// Names of all registered providers
    pub fn provider_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.read().values().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A non-owning reference, for providers that need the container later
    /// without keeping it alive
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            providers: Arc::downgrade(&self.providers),
        }
    }

    /// Clear all providers
    pub fn clear(&self) {
        let mut providers = self.providers.write();
        let count = providers.len();
        providers.clear();

        debug!(provider_count = count, "Cleared all providers from container");
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.provider_names())
            .finish()
    }
}

/// Non-owning reference to a [`Container`].
#[derive(Clone)]
pub struct WeakContainer {
    providers: Weak<RwLock<HashMap<TypeId, Registration>>>,
}

impl WeakContainer {
    /// The container, if it is still alive
    pub fn upgrade(&self) -> Option<Container> {
        self.providers
            .upgrade()
            .map(|providers| Container { providers })
    }
}

impl std::fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.providers.strong_count() > 0))
            .finish()
    }
}
