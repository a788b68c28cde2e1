//! Events module: installs the event service into an application

use crate::config::EventServiceConfig;
use crate::error::EventError;
use crate::registry::ListenerRegistry;
use crate::service::EventService;
use std::sync::Arc;
use tracing::info;
use trellis_config::ConfigManager;
use trellis_core::Application;

/// Installs a single [`EventService`] into an [`Application`].
///
/// The service is registered as a provider, wires declared listeners when
/// the application initializes and drains pending handler work when it is
/// destroyed.
///
/// ```no_run
/// use trellis_core::Application;
/// use trellis_events::{event, EventServiceConfig, EventsModule};
///
/// event!(pub CacheWarmed);
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Application::builder().build();
/// let events = EventsModule::for_root(&app, EventServiceConfig::default()).await;
///
/// app.start().await?;
/// events.emit_payload::<CacheWarmed>(());
/// app.close(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct EventsModule;

impl EventsModule {
    /// Install using the global listener registry
    pub async fn for_root(app: &Application, config: EventServiceConfig) -> Arc<EventService> {
        Self::install(app, EventService::builder().config(config)).await
    }

    /// Install using an explicit listener registry
    pub async fn for_root_with_registry(
        app: &Application,
        config: EventServiceConfig,
        registry: impl Into<Arc<ListenerRegistry>>,
    ) -> Arc<EventService> {
        Self::install(
            app,
            EventService::builder().config(config).registry(registry),
        )
        .await
    }

    /// Install with configuration read from the application's
    /// [`ConfigManager`], or defaults when none is registered
    pub async fn from_config(app: &Application) -> Result<Arc<EventService>, EventError> {
        let config = match app.container().resolve::<ConfigManager>() {
            Ok(manager) => EventServiceConfig::from_config(&manager)?,
            Err(_) => EventServiceConfig::default(),
        };
        Ok(Self::for_root(app, config).await)
    }

    async fn install(
        app: &Application,
        builder: crate::service::EventServiceBuilder,
    ) -> Arc<EventService> {
        let service = app
            .container()
            .register(builder.container(app.container()).build());

        app.lifecycle()
            .register_on_init("EventService", service.clone())
            .await;
        app.lifecycle()
            .register_on_destroy("EventService", service.clone())
            .await;

        info!("Events module installed");
        service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use std::time::Duration;

    event!(Ping(u32));

    #[tokio::test]
    async fn test_service_is_a_provider() {
        let app = Application::builder().build();
        let events = EventsModule::for_root_with_registry(
            &app,
            EventServiceConfig::default(),
            ListenerRegistry::new(),
        )
        .await;

        let resolved = app.get::<EventService>().unwrap();
        assert!(Arc::ptr_eq(&events, &resolved));

        let counts = app.lifecycle().hook_counts().await;
        assert_eq!(counts.init, 1);
        assert_eq!(counts.destroy, 1);
    }

    #[tokio::test]
    async fn test_close_drains_pending_handlers() {
        let app = Application::builder().build();
        let events = EventsModule::for_root_with_registry(
            &app,
            EventServiceConfig::default(),
            ListenerRegistry::new(),
        )
        .await;
        app.start().await.unwrap();

        events.on(|_: &Ping| {
            crate::Outcome::deferred(tokio::time::sleep(Duration::from_millis(20)))
        });
        events.emit(Ping::new(1));
        assert_eq!(events.pending_count(), 1);

        app.close(None).await.unwrap();
        assert_eq!(events.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_from_config_reads_manager() {
        let app = Application::builder().build();
        let manager = ConfigManager::new();
        manager.set("events_drain_timeout_ms", 250).unwrap();
        manager.provide(app.container());

        let events = EventsModule::from_config(&app).await.unwrap();
        assert_eq!(events.config().drain_timeout, Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_values() {
        let app = Application::builder().build();
        let manager = ConfigManager::new();
        manager.set("events_drain_timeout_ms", 0).unwrap();
        manager.provide(app.container());

        assert!(matches!(
            EventsModule::from_config(&app).await,
            Err(EventError::Config(_))
        ));
    }
}
