// Trellis - an application skeleton for Rust services
//
// This library bundles a dependency-injection container, lifecycle hooks and
// an in-process event dispatch service wired into the application lifecycle.

// Re-export core functionality
pub use trellis_core::*;

// Event dispatch, including the `#[event_handlers]` / `#[on_event]` macros
pub use trellis_events as events;
pub use trellis_events::{
    Event, EventError, EventHandler, EventHandlerError, EventKind, EventMetadata, EventService,
    EventServiceConfig, EventsModule, ListenerHandle, ListenerRegistry, Outcome, Publisher,
    event, event_handlers, on_event,
};

pub use trellis_log as log;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application, Container, Error, Event, EventHandler, EventHandlerError, EventService,
        EventServiceConfig, EventsModule, ListenerHandle, OnApplicationBootstrap,
        OnApplicationShutdown, OnModuleDestroy, OnModuleInit, Outcome, Provider, Publisher,
        Service, event, event_handlers, on_event,
    };

    #[cfg(feature = "config")]
    pub use crate::trellis_config::{ConfigManager, Validate};

    pub use async_trait::async_trait;
}
