//! In-process event dispatch for Trellis applications
//!
//! This crate provides typed publish/subscribe scoped to one running
//! application instance.
//!
//! ## Features
//!
//! - **Event Service** - `emit`, `on`, `once`, detachable listener handles
//! - **Declared Listeners** - `#[event_handlers]` classes wired at startup
//! - **Tracked Async Work** - deferred handler work is awaited on shutdown
//! - **Failure Isolation** - a failing listener never affects the emitter
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_events::*;
//!
//! #[derive(Debug, Clone)]
//! pub struct NewUser {
//!     pub email: String,
//! }
//!
//! // Define an event kind carrying a payload
//! event!(pub UserCreated(NewUser));
//!
//! let events = EventService::new();
//!
//! // Attach a listener
//! let handle = events.on(|event: &UserCreated| {
//!     println!("Sending welcome email to {}", event.data.email);
//! });
//!
//! // Emit an event
//! events.emit_payload::<UserCreated>(NewUser {
//!     email: "alice@example.com".to_string(),
//! });
//!
//! // Detach the listener again
//! handle.detach();
//! ```
//!
//! ## Declared Listeners
//!
//! ```rust,ignore
//! struct WelcomeMailer {
//!     mailer: Arc<Mailer>,
//! }
//!
//! #[event_handlers]
//! impl WelcomeMailer {
//!     #[on_event]
//!     fn on_user_created(&self, event: &UserCreated) -> Outcome {
//!         let mailer = self.mailer.clone();
//!         let email = event.data.email.clone();
//!         Outcome::pending(async move { mailer.send_welcome(&email).await })
//!     }
//! }
//!
//! // `WelcomeMailer` must be registered in the container; the events module
//! // binds `on_user_created` to it when the application initializes.
//! app.container().register(WelcomeMailer { mailer });
//! let events = EventsModule::for_root(&app, EventServiceConfig::default()).await;
//! app.start().await?;
//! ```
//!
//! ## Asynchronous Handlers
//!
//! ```rust,ignore
//! struct AuditTrail;
//!
//! #[async_trait]
//! impl EventHandler<UserCreated> for AuditTrail {
//!     async fn handle(&self, event: &UserCreated) -> Result<(), EventHandlerError> {
//!         store_audit_record(&event.data).await.map_err(|e| e.to_string())?;
//!         Ok(())
//!     }
//! }
//!
//! events.subscribe(AuditTrail);
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! let events = EventService::builder()
//!     .detached_delivery(false)                // Deliver on the emitting thread
//!     .log_emits(true)                         // Log events
//!     .drain_timeout(Duration::from_secs(10))  // Bound shutdown draining
//!     .build();
//! ```

// Lets `#[event_handlers]` refer to `::trellis_events` inside this crate too
extern crate self as trellis_events;

pub mod config;
pub mod error;
pub mod event;
pub mod listeners;
pub mod module;
pub mod outcome;
pub mod publisher;
pub mod registry;
pub mod service;

pub use config::{EventServiceConfig, EventServiceConfigBuilder};
pub use error::{EventError, EventHandlerError};
pub use event::{AsAny, Event, EventData, EventKind, EventMetadata, EventSource, FromPayload};
pub use listeners::{Callback, Listener, ListenerHandle};
pub use module::EventsModule;
pub use outcome::{EventHandler, HandlerFuture, IntoOutcome, Outcome};
pub use publisher::Publisher;
pub use registry::{
    Binder, DeclaresListeners, ListenerBinding, ListenerClass, ListenerDeclaration,
    ListenerRegistry,
};
pub use service::{EventService, EventServiceBuilder};

pub use trellis_macros::{event_handlers, on_event};

#[doc(hidden)]
pub use inventory;
#[doc(hidden)]
pub use trellis_core::SharedInstance;
