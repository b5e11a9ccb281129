//! Lifecycle registry for background subsystems.
//!
//! The subscription manager and the maintenance scheduler are
//! lifecycle-managed: registered once at bootstrap, initialized in
//! registration order, and shut down in reverse order. Type-based lookup
//! lets tests grab a concrete service back out of the registry.

use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::config::ServerConfig;

/// Context provided to services during initialization.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Shared server configuration.
    pub config: Arc<ServerConfig>,
}

/// Lifecycle-managed background service.
///
/// The `Any` bound enables type-based lookup via
/// [`ServiceRegistry::get::<T>()`].
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name of this service (e.g. `"subscriptions"`).
    fn name(&self) -> &'static str;

    /// Starts the service's background work.
    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Stops the service's background work.
    async fn shutdown(&self) -> anyhow::Result<()>;
}

/// Registry for lifecycle-managed services.
///
/// Initialization runs in registration order; shutdown runs in reverse,
/// so later services can depend on earlier ones being alive.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init_order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Registers a service under its name and concrete type.
    pub fn register<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        self.by_name
            .insert(name, Arc::clone(&service) as Arc<dyn ManagedService>);
        self.by_type.insert(TypeId::of::<T>(), service);
        self.init_order.write().push(name);
    }

    /// Retrieves a service by concrete type.
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieves a service by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Initializes all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first failing service's error.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                service.init(ctx).await?;
            }
        }
        Ok(())
    }

    /// Shuts down all registered services in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns the first failing service's error.
    pub async fn shutdown_all(&self) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                service.shutdown().await?;
            }
        }
        Ok(())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
