//! Application host.
//!
//! Owns the DI container and the lifecycle manager, and drives the phases:
//!
//! 1. [`Application::init`] runs every `OnModuleInit` hook. Any failure is
//!    fatal and aborts startup.
//! 2. [`Application::bootstrap`] runs `OnApplicationBootstrap` hooks.
//! 3. [`Application::close`] runs `OnModuleDestroy`, then
//!    `BeforeApplicationShutdown`, then `OnApplicationShutdown`, optionally
//!    bounded by a deadline.
//!
//! ```no_run
//! use trellis_core::Application;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), trellis_core::Error> {
//! let app = Application::builder()
//!     .shutdown_timeout(Duration::from_secs(30))
//!     .build();
//!
//! app.start().await?;
//! app.run_until_signal().await
//! # }
//! ```

use crate::lifecycle::{HookFailures, LifecycleManager};
use crate::{Container, Error, Provider};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Where the application is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Closing = 3,
    Closed = 4,
}

impl AppState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AppState::Created,
            1 => AppState::Initialized,
            2 => AppState::Running,
            3 => AppState::Closing,
            _ => AppState::Closed,
        }
    }
}

/// Hosts the container and lifecycle of one running application instance.
#[derive(Clone)]
pub struct Application {
    container: Container,
    lifecycle: LifecycleManager,
    shutdown_timeout: Option<Duration>,
    state: Arc<AtomicU8>,
}

impl Application {
    /// Create an application around an existing container
    pub fn new(container: Container) -> Self {
        Self {
            container,
            lifecycle: LifecycleManager::new(),
            shutdown_timeout: None,
            state: Arc::new(AtomicU8::new(AppState::Created as u8)),
        }
    }

    /// Start building an application
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// The DI container
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The lifecycle manager, for registering hooks
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Resolve a provider from the container
    pub fn get<T: Provider>(&self) -> Result<Arc<T>, Error> {
        self.container.resolve::<T>()
    }

    /// Current lifecycle state
    pub fn state(&self) -> AppState {
        AppState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: AppState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run `OnModuleInit` hooks. Any failure aborts startup.
    pub async fn init(&self) -> Result<(), Error> {
        self.lifecycle
            .call_module_init_hooks()
            .await
            .map_err(|failures| lifecycle_error("onModuleInit", failures))?;

        self.set_state(AppState::Initialized);
        info!("Application initialized");
        Ok(())
    }

    /// Run `OnApplicationBootstrap` hooks.
    pub async fn bootstrap(&self) -> Result<(), Error> {
        self.lifecycle
            .call_bootstrap_hooks()
            .await
            .map_err(|failures| lifecycle_error("onApplicationBootstrap", failures))?;

        self.set_state(AppState::Running);
        info!("Application bootstrapped");
        Ok(())
    }

    /// Initialize and bootstrap in one step.
    pub async fn start(&self) -> Result<(), Error> {
        self.init().await?;
        self.bootstrap().await
    }

    /// Gracefully shut the application down.
    ///
    /// Teardown hooks keep running after a failure; the first failing phase
    /// is reported once every phase had its turn. With a shutdown timeout
    /// configured the whole sequence is bounded by it.
    pub async fn close(&self, signal: Option<String>) -> Result<(), Error> {
        if matches!(self.state(), AppState::Closing | AppState::Closed) {
            warn!("Application close requested twice, ignoring");
            return Ok(());
        }
        self.set_state(AppState::Closing);
        info!(signal = ?signal, "Closing application");

        let result = match self.shutdown_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.teardown(signal)).await {
                Ok(result) => result,
                Err(_) => {
                    error!(timeout = ?limit, "Application shutdown timed out");
                    Err(Error::ShutdownTimeout(limit))
                }
            },
            None => self.teardown(signal).await,
        };

        self.set_state(AppState::Closed);
        info!("Application closed");
        result
    }

    async fn teardown(&self, signal: Option<String>) -> Result<(), Error> {
        let destroy = self.lifecycle.call_module_destroy_hooks().await;
        let before = self.lifecycle.call_before_shutdown_hooks(signal.clone()).await;
        let shutdown = self.lifecycle.call_shutdown_hooks(signal).await;

        destroy.map_err(|f| lifecycle_error("onModuleDestroy", f))?;
        before.map_err(|f| lifecycle_error("beforeApplicationShutdown", f))?;
        shutdown.map_err(|f| lifecycle_error("onApplicationShutdown", f))
    }

    /// Wait for Ctrl-C (or SIGTERM on unix), then close the application.
    pub async fn run_until_signal(&self) -> Result<(), Error> {
        let signal = wait_for_signal().await?;
        self.close(Some(signal)).await
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.state())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

fn lifecycle_error(phase: &'static str, failures: HookFailures) -> Error {
    Error::Lifecycle {
        phase,
        failures: failures
            .into_iter()
            .map(|(name, e)| (name, e.to_string()))
            .collect(),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<String, Error> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map(|_| "SIGINT".to_string()).map_err(Error::from)
        }
        _ = terminate.recv() => Ok("SIGTERM".to_string()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<String, Error> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT".to_string())
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    container: Container,
    shutdown_timeout: Option<Duration>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            shutdown_timeout: None,
        }
    }

    /// Use an existing container
    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    /// Register a provider instance
    pub fn provider<T: Provider>(self, instance: T) -> Self {
        self.container.register(instance);
        self
    }

    /// Bound the whole shutdown sequence
    pub fn shutdown_timeout(mut self, limit: Duration) -> Self {
        self.shutdown_timeout = Some(limit);
        self
    }

    pub fn build(self) -> Application {
        let mut app = Application::new(self.container);
        app.shutdown_timeout = self.shutdown_timeout;
        app
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleResult, OnModuleDestroy, OnModuleInit};
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl OnModuleDestroy for Slow {
        async fn on_module_destroy(&self) -> LifecycleResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl OnModuleInit for Broken {
        async fn on_module_init(&self) -> LifecycleResult {
            Err("database unreachable".into())
        }
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let app = Application::builder().build();
        assert_eq!(app.state(), AppState::Created);

        app.start().await.unwrap();
        assert_eq!(app.state(), AppState::Running);

        app.close(None).await.unwrap();
        assert_eq!(app.state(), AppState::Closed);

        // Closing twice is harmless.
        app.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let app = Application::builder().build();
        app.lifecycle().register_on_init("Broken", Arc::new(Broken)).await;

        let err = app.init().await.unwrap_err();
        assert!(err.to_string().contains("Broken: database unreachable"));
        assert_eq!(app.state(), AppState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout() {
        let app = Application::builder()
            .shutdown_timeout(Duration::from_millis(100))
            .build();
        app.lifecycle().register_on_destroy("Slow", Arc::new(Slow)).await;

        let err = app.close(None).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout(_)));
        assert_eq!(app.state(), AppState::Closed);
    }

    #[tokio::test]
    async fn test_builder_registers_providers() {
        struct Settings {
            port: u16,
        }

        let app = Application::builder().provider(Settings { port: 3000 }).build();
        assert_eq!(app.get::<Settings>().unwrap().port, 3000);
    }
}
