// Publishing helper for services holding the event service

use crate::event::{Event, EventSource, FromPayload};
use crate::service::EventService;
use std::sync::Arc;

/// Implemented by providers that publish events.
///
/// Events published through this trait are stamped with the publisher as
/// their [`EventSource`].
///
/// ```
/// use std::sync::Arc;
/// use trellis_events::{event, EventService, Publisher};
///
/// event!(pub OrderPlaced(u64));
///
/// struct Orders {
///     events: Arc<EventService>,
/// }
///
/// impl Publisher for Orders {
///     fn events(&self) -> &EventService {
///         &self.events
///     }
/// }
///
/// let events = Arc::new(EventService::new());
/// events.on(|order: &OrderPlaced| {
///     println!("order {} placed by {:?}", order.data, order.metadata.source);
/// });
///
/// let orders = Arc::new(Orders { events });
/// orders.publish_shared::<OrderPlaced>(42);
/// ```
pub trait Publisher: Send + Sync + Sized + 'static {
    fn events(&self) -> &EventService;

    /// Emit an `E` stamped with the publisher type
    fn publish<E: FromPayload>(&self, payload: E::Payload) {
        self.events()
            .emit_from::<E>(EventSource::of::<Self>(), payload);
    }

    /// Emit an `E` carrying a reference to this publisher instance
    fn publish_shared<E: FromPayload>(self: &Arc<Self>, payload: E::Payload) {
        self.events()
            .emit_from::<E>(EventSource::from_instance(self.clone()), payload);
    }

    /// Emit a prepared event as is
    fn publish_event<E: Event>(&self, event: E) {
        self.events().emit(event);
    }
}
