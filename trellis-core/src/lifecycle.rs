//! Lifecycle hook system for Trellis applications.
//!
//! Components opt into the phases they care about by implementing the hook
//! traits and registering with a [`LifecycleManager`].
//!
//! ## Available Hooks
//!
//! - `OnModuleInit` - Called once the component's dependencies are resolved
//! - `OnApplicationBootstrap` - Called once every module has been initialized
//! - `OnModuleDestroy` - Called after a termination signal has been received
//! - `BeforeApplicationShutdown` - Called after every `OnModuleDestroy` hook settled
//! - `OnApplicationShutdown` - Called last, once the application stopped serving
//!
//! Init and bootstrap hooks run in registration order. Teardown hooks run in
//! reverse registration order, so a component is torn down before the
//! components it was built on.
//!
//! ## Examples
//!
//! ```
//! use trellis_core::lifecycle::{LifecycleResult, OnModuleInit, OnModuleDestroy};
//! use async_trait::async_trait;
//!
//! struct Mailer {
//!     name: String,
//! }
//!
//! #[async_trait]
//! impl OnModuleInit for Mailer {
//!     async fn on_module_init(&self) -> LifecycleResult {
//!         println!("{} connected", self.name);
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl OnModuleDestroy for Mailer {
//!     async fn on_module_destroy(&self) -> LifecycleResult {
//!         println!("{} flushed", self.name);
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Boxed error returned by lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for lifecycle operations
pub type LifecycleResult = Result<(), BoxError>;

/// Failures collected while running one phase, as `(component, error)`.
pub type HookFailures = Vec<(String, BoxError)>;

/// Hook called after module dependencies are resolved
#[async_trait]
pub trait OnModuleInit: Send + Sync {
    /// Called once the module has been initialized
    async fn on_module_init(&self) -> LifecycleResult;
}

/// Hook called before module is destroyed
#[async_trait]
pub trait OnModuleDestroy: Send + Sync {
    /// Called before the module is destroyed
    async fn on_module_destroy(&self) -> LifecycleResult;
}

/// Hook called after all modules have been initialized
#[async_trait]
pub trait OnApplicationBootstrap: Send + Sync {
    /// Called once the application has fully started
    async fn on_application_bootstrap(&self) -> LifecycleResult;
}

/// Hook called during application shutdown
#[async_trait]
pub trait OnApplicationShutdown: Send + Sync {
    /// Called when the application is shutting down
    async fn on_application_shutdown(&self, signal: Option<String>) -> LifecycleResult;
}

/// Hook called once every destroy hook has settled
#[async_trait]
pub trait BeforeApplicationShutdown: Send + Sync {
    /// Called before application shutdown hooks
    async fn before_application_shutdown(&self, signal: Option<String>) -> LifecycleResult;
}

type Hooks<H> = Arc<RwLock<Vec<(String, Arc<H>)>>>;

/// Manages lifecycle hooks for all registered components
#[derive(Clone, Default)]
pub struct LifecycleManager {
    init_hooks: Hooks<dyn OnModuleInit>,
    destroy_hooks: Hooks<dyn OnModuleDestroy>,
    bootstrap_hooks: Hooks<dyn OnApplicationBootstrap>,
    before_shutdown_hooks: Hooks<dyn BeforeApplicationShutdown>,
    shutdown_hooks: Hooks<dyn OnApplicationShutdown>,
}

impl LifecycleManager {
    /// Create a new lifecycle manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an OnModuleInit hook
    pub async fn register_on_init(&self, name: impl Into<String>, hook: Arc<dyn OnModuleInit>) {
        self.init_hooks.write().await.push((name.into(), hook));
    }

    /// Register an OnModuleDestroy hook
    pub async fn register_on_destroy(
        &self,
        name: impl Into<String>,
        hook: Arc<dyn OnModuleDestroy>,
    ) {
        self.destroy_hooks.write().await.push((name.into(), hook));
    }

    /// Register an OnApplicationBootstrap hook
    pub async fn register_on_bootstrap(
        &self,
        name: impl Into<String>,
        hook: Arc<dyn OnApplicationBootstrap>,
    ) {
        self.bootstrap_hooks.write().await.push((name.into(), hook));
    }

    /// Register a BeforeApplicationShutdown hook
    pub async fn register_before_shutdown(
        &self,
        name: impl Into<String>,
        hook: Arc<dyn BeforeApplicationShutdown>,
    ) {
        self.before_shutdown_hooks.write().await.push((name.into(), hook));
    }

    /// Register an OnApplicationShutdown hook
    pub async fn register_on_shutdown(
        &self,
        name: impl Into<String>,
        hook: Arc<dyn OnApplicationShutdown>,
    ) {
        self.shutdown_hooks.write().await.push((name.into(), hook));
    }

    /// Execute all OnModuleInit hooks
    pub async fn call_module_init_hooks(&self) -> Result<(), HookFailures> {
        info!("Calling module initialization hooks");
        let hooks = snapshot(&self.init_hooks, false).await;
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            record("onModuleInit", name, hook.on_module_init().await, &mut failures);
        }

        into_result(failures)
    }

    /// Execute all OnModuleDestroy hooks (reverse order)
    pub async fn call_module_destroy_hooks(&self) -> Result<(), HookFailures> {
        info!("Calling module destruction hooks");
        let hooks = snapshot(&self.destroy_hooks, true).await;
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            record("onModuleDestroy", name, hook.on_module_destroy().await, &mut failures);
        }

        into_result(failures)
    }

    /// Execute all OnApplicationBootstrap hooks
    pub async fn call_bootstrap_hooks(&self) -> Result<(), HookFailures> {
        info!("Calling application bootstrap hooks");
        let hooks = snapshot(&self.bootstrap_hooks, false).await;
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            let result = hook.on_application_bootstrap().await;
            record("onApplicationBootstrap", name, result, &mut failures);
        }

        into_result(failures)
    }

    /// Execute all BeforeApplicationShutdown hooks
    pub async fn call_before_shutdown_hooks(
        &self,
        signal: Option<String>,
    ) -> Result<(), HookFailures> {
        info!(signal = ?signal, "Calling before shutdown hooks");
        let hooks = snapshot(&self.before_shutdown_hooks, false).await;
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            let result = hook.before_application_shutdown(signal.clone()).await;
            record("beforeApplicationShutdown", name, result, &mut failures);
        }

        into_result(failures)
    }

    /// Execute all OnApplicationShutdown hooks (reverse order)
    pub async fn call_shutdown_hooks(&self, signal: Option<String>) -> Result<(), HookFailures> {
        info!(signal = ?signal, "Calling application shutdown hooks");
        let hooks = snapshot(&self.shutdown_hooks, true).await;
        let mut failures = Vec::new();

        for (name, hook) in hooks {
            let result = hook.on_application_shutdown(signal.clone()).await;
            record("onApplicationShutdown", name, result, &mut failures);
        }

        into_result(failures)
    }

    /// Get the number of registered hooks of each type
    pub async fn hook_counts(&self) -> LifecycleHookCounts {
        LifecycleHookCounts {
            init: self.init_hooks.read().await.len(),
            destroy: self.destroy_hooks.read().await.len(),
            bootstrap: self.bootstrap_hooks.read().await.len(),
            shutdown: self.shutdown_hooks.read().await.len(),
            before_shutdown: self.before_shutdown_hooks.read().await.len(),
        }
    }

    /// Clear all registered hooks
    pub async fn clear(&self) {
        self.init_hooks.write().await.clear();
        self.destroy_hooks.write().await.clear();
        self.bootstrap_hooks.write().await.clear();
        self.shutdown_hooks.write().await.clear();
        self.before_shutdown_hooks.write().await.clear();
    }
}

// Hooks may register further hooks, so the lock is never held while one runs.
async fn snapshot<H: ?Sized>(hooks: &Hooks<H>, reverse: bool) -> Vec<(String, Arc<H>)> {
    let mut list = hooks.read().await.clone();
    if reverse {
        list.reverse();
    }
    list
}

fn record(phase: &str, name: String, result: LifecycleResult, failures: &mut HookFailures) {
    match result {
        Ok(()) => debug!(component = %name, phase, "Lifecycle hook completed"),
        Err(e) => {
            error!(component = %name, phase, error = %e, "Lifecycle hook failed");
            failures.push((name, e));
        }
    }
}

fn into_result(failures: HookFailures) -> Result<(), HookFailures> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

/// Statistics about registered lifecycle hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleHookCounts {
    pub init: usize,
    pub destroy: usize,
    pub bootstrap: usize,
    pub shutdown: usize,
    pub before_shutdown: usize,
}
