//! Event dispatch service
//!
//! The live publish/subscribe core. Listeners for an event kind run in
//! registration order, each inside its own failure boundary: a listener that
//! returns an error or panics is logged and the next one still runs. Nothing
//! a listener does ever reaches the caller of `emit`.
//!
//! Listeners run synchronously on the emitting thread. Deferred work they
//! return as [`Outcome::Pending`] is spawned and tracked, and
//! `on_module_destroy` waits for it before the service is torn down.
//!
//! Deferred work is spawned on the runtime the service was built in or
//! initialized in, so `emit` may be called from any thread.

use crate::config::EventServiceConfig;
use crate::error::{EventError, EventHandlerError};
use crate::event::{Event, EventKind, EventMetadata, EventSource, FromPayload};
use crate::listeners::{Callback, Descriptor, Listener, ListenerHandle, ListenerTable};
use crate::outcome::{EventHandler, IntoOutcome, Outcome};
use crate::registry::ListenerRegistry;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::TypeId;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};
use trellis_core::lifecycle::{LifecycleResult, OnModuleDestroy, OnModuleInit};
use trellis_core::{Container, Service, WeakContainer, WorkTracker};
use trellis_log::Logger;

/// Event dispatch service
pub struct EventService {
    listeners: Arc<ListenerTable>,
    registry: Arc<ListenerRegistry>,
    container: Option<WeakContainer>,
    ephemeral: Mutex<Vec<ListenerHandle>>,
    work: WorkTracker,
    config: EventServiceConfig,
    logger: Logger,
}

impl EventService {
    /// Create an event service reading declared listeners from the global
    /// registry
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create event service with custom config
    pub fn with_config(config: EventServiceConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EventServiceBuilder {
        EventServiceBuilder::new()
    }

    pub fn config(&self) -> &EventServiceConfig {
        &self.config
    }

    /// Registry of declared listeners wired at startup
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Emit an event.
    ///
    /// Returns once every listener has been invoked (or, with detached
    /// delivery, once delivery is scheduled). Never waits for deferred work.
    pub fn emit<E: Event>(&self, event: E) {
        self.emit_shared(Arc::new(event));
    }

    /// Build an event of kind `E` from its payload and emit it
    pub fn emit_payload<E: FromPayload>(&self, payload: E::Payload) {
        self.emit(E::from_payload(payload, EventMetadata::new()));
    }

    /// Build an event of kind `E` stamped with its emitter and emit it
    pub fn emit_from<E: FromPayload>(&self, source: EventSource, payload: E::Payload) {
        self.emit(E::from_payload(
            payload,
            EventMetadata::new().with_source(source),
        ));
    }

    /// Emit an already shared, type-erased event
    pub fn emit_shared(&self, event: Arc<dyn Event>) {
        let kind = event.kind();
        let snapshot = self.listeners.snapshot(kind.id());

        if self.config.log_emits {
            debug!(
                event = %kind,
                event_id = %event.metadata().id,
                listeners = snapshot.len(),
                "Emitting event"
            );
        }

        if snapshot.is_empty() {
            trace!(event = %kind, "No listeners registered");
            return;
        }

        if self.config.detached_delivery {
            if self.work.runtime().is_some() {
                let table = self.listeners.clone();
                let work = self.work.clone();
                self.work.track(async move {
                    deliver(&table, snapshot, &event, &work);
                });
                return;
            }
            warn!(event = %kind, "No async runtime available, delivering inline");
        }

        deliver(&self.listeners, snapshot, &event, &self.work);
    }

    /// Attach a durable listener for events of kind `E`
    pub fn on<E, F, R>(&self, handler: F) -> ListenerHandle
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.attach(Listener::new::<E, F, R>(handler), false)
    }

    /// Attach a listener that removes itself after its first invocation
    pub fn once<E, F, R>(&self, handler: F) -> ListenerHandle
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.attach(Listener::new::<E, F, R>(handler), true)
    }

    /// Attach a [`Callback`], removable later with
    /// [`EventService::remove_listener`]
    pub fn on_callback<E: Event>(&self, callback: &Callback<E>) -> ListenerHandle {
        self.attach(Listener::from_callback(callback), false)
    }

    /// Once-only form of [`EventService::on_callback`]
    pub fn once_callback<E: Event>(&self, callback: &Callback<E>) -> ListenerHandle {
        self.attach(Listener::from_callback(callback), true)
    }

    /// Attach an asynchronous [`EventHandler`]; every invocation is tracked
    pub fn subscribe<E, H>(&self, handler: H) -> ListenerHandle
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.attach(Listener::from_handler::<E, H>(Arc::new(handler)), false)
    }

    /// Attach a prepared listener
    pub fn attach(&self, listener: Listener, once: bool) -> ListenerHandle {
        let descriptor = self.listeners.insert(listener, once);
        trace!(
            event = %descriptor.kind(),
            listener = descriptor.label(),
            once,
            "Listener attached"
        );
        ListenerHandle::new(&self.listeners, &descriptor)
    }

    /// Remove the first listener attached from `callback`.
    ///
    /// Returns whether one was found; a missing listener is not an error.
    pub fn remove_listener<E: Event>(&self, callback: &Callback<E>) -> bool {
        self.listeners
            .remove_by_origin(TypeId::of::<E>(), callback.identity())
    }

    /// Number of live listeners for `E`
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners.count(TypeId::of::<E>())
    }

    /// Number of live listeners across all kinds
    pub fn total_listeners(&self) -> usize {
        self.listeners.total()
    }

    /// Deferred handler work still in flight
    pub fn pending_count(&self) -> usize {
        self.work.pending()
    }

    /// Detach every listener, declared or ad hoc
    pub fn clear(&self) {
        self.ephemeral.lock().clear();
        self.listeners.clear();
        info!("Cleared all event listeners");
    }

    /// Attach every method of the listener registry to its class instance
    /// resolved from the container.
    ///
    /// Listeners wired by an earlier call are detached first. Returns the
    /// number of listeners attached.
    pub fn wire_declared(&self) -> Result<usize, EventError> {
        self.detach_declared();

        let classes = self.registry.types();
        if classes.is_empty() {
            return Ok(0);
        }

        let container = self.container().ok_or(EventError::NoContainer)?;
        let mut handles = Vec::new();

        if let Err(e) = self.bind_classes(&container, &mut handles) {
            for handle in &handles {
                handle.detach();
            }
            return Err(e);
        }

        let count = handles.len();
        self.logger.info(format_args!(
            "Wired {} declared listener(s) from {} class(es)",
            count,
            classes.len()
        ));
        *self.ephemeral.lock() = handles;
        Ok(count)
    }

    fn bind_classes(
        &self,
        container: &Container,
        handles: &mut Vec<ListenerHandle>,
    ) -> Result<(), EventError> {
        for class in self.registry.types() {
            let instance = container
                .resolve_by_id(class.id())
                .ok_or(EventError::ListenerNotResolvable { class: class.name() })?;

            for binding in self.registry.methods_of(class.id()) {
                let listener = binding.bind(instance.clone()).ok_or(
                    EventError::ListenerTypeMismatch {
                        class: class.name(),
                        method: binding.method(),
                    },
                )?;

                let label = format!("{}.{}", class, binding.method());
                handles.push(self.attach(listener.labeled(label), false));
            }
        }
        Ok(())
    }

    /// Detach the listeners attached by [`EventService::wire_declared`].
    /// Returns how many were still attached.
    pub fn detach_declared(&self) -> usize {
        let handles = std::mem::take(&mut *self.ephemeral.lock());
        handles.iter().filter(|handle| handle.detach()).count()
    }

    /// Number of listeners currently held from the startup wiring pass
    pub fn declared_count(&self) -> usize {
        self.ephemeral
            .lock()
            .iter()
            .filter(|handle| handle.is_attached())
            .count()
    }

    /// Wait for all deferred handler work, including work that starts while
    /// waiting. Bounded by the configured drain timeout, if any.
    pub async fn drain(&self) -> Result<(), EventError> {
        let pending = self.work.pending();
        if pending > 0 {
            info!(pending, "Waiting for pending event handlers");
        }

        match self.config.drain_timeout {
            Some(limit) => self.drain_within(limit).await,
            None => {
                self.work.wait_for_pending().await;
                Ok(())
            }
        }
    }

    async fn drain_within(&self, limit: Duration) -> Result<(), EventError> {
        if self.work.wait_for_pending_timeout(limit).await {
            Ok(())
        } else {
            Err(EventError::DrainTimeout {
                timeout: limit,
                pending: self.work.pending(),
            })
        }
    }

    fn container(&self) -> Option<Container> {
        self.container.as_ref().and_then(WeakContainer::upgrade)
    }
}

impl Default for EventService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventService")
            .field("listeners", &self.listeners.total())
            .field("pending", &self.work.pending())
            .field("config", &self.config)
            .finish()
    }
}

impl Service for EventService {
    fn work(&self) -> &WorkTracker {
        &self.work
    }

    fn logger(&self) -> Logger {
        self.logger.clone()
    }
}

#[async_trait]
impl OnModuleInit for EventService {
    async fn on_module_init(&self) -> LifecycleResult {
        if let Ok(runtime) = Handle::try_current() {
            self.work.bind_runtime(runtime);
        }
        self.wire_declared()?;
        Ok(())
    }
}

#[async_trait]
impl OnModuleDestroy for EventService {
    async fn on_module_destroy(&self) -> LifecycleResult {
        self.drain().await?;
        self.logger.debug("Event service drained");
        Ok(())
    }
}

/// Run one emission against a snapshot of listeners.
fn deliver(
    table: &ListenerTable,
    snapshot: Vec<Arc<Descriptor>>,
    event: &Arc<dyn Event>,
    work: &WorkTracker,
) {
    for descriptor in snapshot {
        // Skips listeners detached since the snapshot, and unlinks `once`
        // listeners before they run.
        if !table.claim(&descriptor) {
            continue;
        }

        let outcome = match catch_unwind(AssertUnwindSafe(|| descriptor.invoke(event))) {
            Ok(outcome) => outcome,
            Err(payload) => Outcome::Failed(EventHandlerError::from_panic(payload)),
        };

        match outcome {
            Outcome::Done => {}
            Outcome::Failed(e) => report(descriptor.kind(), descriptor.label(), &e),
            Outcome::Pending(pending) => {
                let kind = descriptor.kind();
                let label = descriptor.label().to_string();
                work.track(async move {
                    let result = match AssertUnwindSafe(pending).catch_unwind().await {
                        Ok(result) => result,
                        Err(payload) => Err(EventHandlerError::from_panic(payload)),
                    };
                    if let Err(e) = result {
                        report(kind, &label, &e);
                    }
                });
            }
        }
    }
}

fn report(kind: EventKind, listener: &str, error: &EventHandlerError) {
    error!(event = %kind, listener, error = %error, "Error in event handler");
}

/// Event service builder
pub struct EventServiceBuilder {
    config: EventServiceConfig,
    registry: Option<Arc<ListenerRegistry>>,
    container: Option<WeakContainer>,
    runtime: Option<Handle>,
}

impl EventServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: EventServiceConfig::default(),
            registry: None,
            container: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: EventServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit registry instead of the global one
    pub fn registry(mut self, registry: impl Into<Arc<ListenerRegistry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Container used to resolve declared listener classes. Only a weak
    /// reference is kept.
    pub fn container(mut self, container: &Container) -> Self {
        self.container = Some(container.downgrade());
        self
    }

    /// Enable/disable detached delivery
    pub fn detached_delivery(mut self, enabled: bool) -> Self {
        self.config.detached_delivery = enabled;
        self
    }

    /// Enable/disable emit logging
    pub fn log_emits(mut self, enabled: bool) -> Self {
        self.config.log_emits = enabled;
        self
    }

    /// Bound shutdown draining
    pub fn drain_timeout(mut self, limit: Duration) -> Self {
        self.config.drain_timeout = Some(limit);
        self
    }

    /// Runtime for deferred handler work, used when `emit` runs outside
    /// any runtime context. Defaults to the runtime `build` is called in.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> EventService {
        let work = WorkTracker::new();
        if let Some(handle) = self.runtime {
            work.bind_runtime(handle);
        }

        EventService {
            listeners: Arc::new(ListenerTable::new()),
            registry: self.registry.unwrap_or_else(ListenerRegistry::global),
            container: self.container,
            ephemeral: Mutex::new(Vec::new()),
            work,
            config: self.config,
            logger: Logger::for_type::<EventService>(),
        }
    }
}

impl Default for EventServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
