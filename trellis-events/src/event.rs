//! Event definitions and traits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Object-safe access to [`Any`] for every event.
///
/// Blanket-implemented; call it through `&dyn Event`, never on an `Arc`,
/// otherwise the `Arc` itself is what gets erased.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Event trait
///
/// All events must implement this trait to be emitted through the
/// [`EventService`](crate::EventService). The concrete type is the event's
/// kind: listeners are looked up by exact type, never by a trait the event
/// happens to implement.
pub trait Event: AsAny + Debug {
    /// Event metadata
    fn metadata(&self) -> &EventMetadata;

    /// Get event name
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl dyn Event {
    /// The kind of the concrete event behind this reference
    pub fn kind(&self) -> EventKind {
        EventKind {
            id: self.as_any().type_id(),
            name: self.event_name(),
        }
    }

    /// Whether the concrete event is an `E`
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Downcast to a concrete event
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Identity of an event kind: its concrete type.
///
/// Equality and hashing only look at the `TypeId`; the name is carried for
/// logs.
#[derive(Clone, Copy)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    /// The kind of `E`
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name of the event
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({})", self.name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&trellis_log::short_type_name(self.name))
    }
}

/// The object that emitted an event.
#[derive(Clone)]
pub struct EventSource {
    type_id: TypeId,
    type_name: &'static str,
    instance: Option<Arc<dyn Any + Send + Sync>>,
}

impl EventSource {
    /// A source identified by type only
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            instance: None,
        }
    }

    /// A source carrying a shared reference to the emitting instance
    pub fn from_instance<T: Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            instance: Some(instance),
        }
    }

    /// Whether the event was emitted by a `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The emitting instance, if one was attached and it is a `T`
    pub fn instance<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instance.clone()?.downcast::<T>().ok()
    }
}

impl Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("type_name", &self.type_name)
            .field("has_instance", &self.instance.is_some())
            .finish()
    }
}

/// Base event metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub id: Uuid,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// Optional correlation ID for tracing
    pub correlation_id: Option<Uuid>,

    /// Optional causation ID (ID of the event that caused this event)
    pub causation_id: Option<Uuid>,

    /// Custom attributes
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,

    /// Emitter of the event, never serialized
    #[serde(skip)]
    pub source: Option<EventSource>,
}

impl EventMetadata {
    /// Create new event metadata
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            causation_id: None,
            attributes: serde_json::Map::new(),
            source: None,
        }
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Set causation ID
    pub fn with_causation_id(mut self, id: Uuid) -> Self {
        self.causation_id = Some(id);
        self
    }

    /// Mark this event as caused by `parent`, inheriting its correlation
    pub fn caused_by(mut self, parent: &EventMetadata) -> Self {
        self.causation_id = Some(parent.id);
        self.correlation_id = Some(parent.correlation_id.unwrap_or(parent.id));
        self
    }

    /// Attach the emitter
    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a custom attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can be built from a kind plus a payload.
pub trait FromPayload: Event + Sized {
    type Payload: Send + Sync + 'static;

    fn from_payload(payload: Self::Payload, metadata: EventMetadata) -> Self;
}

/// The payload type of an event kind.
pub type EventData<E> = <E as FromPayload>::Payload;

/// Define an event kind carrying a payload.
///
/// ```
/// use trellis_events::{event, Event};
///
/// #[derive(Debug, Clone)]
/// pub struct Signup {
///     pub email: String,
/// }
///
/// event!(pub UserSignedUp(Signup));
/// event!(#[derive(Clone)] pub CacheFlushed);
///
/// let event = UserSignedUp::new(Signup { email: "ada@example.com".into() });
/// assert_eq!(event.data.email, "ada@example.com");
/// assert!(event.metadata().source.is_none());
/// ```
#[macro_export]
macro_rules! event {
    ($(#[$attr:meta])* $vis:vis $name:ident($payload:ty)) => {
        $(#[$attr])*
        #[derive(Debug)]
        $vis struct $name {
            pub data: $payload,
            pub metadata: $crate::EventMetadata,
        }

        impl $name {
            pub fn new(data: $payload) -> Self {
                Self {
                    data,
                    metadata: $crate::EventMetadata::new(),
                }
            }
        }

        impl $crate::Event for $name {
            fn metadata(&self) -> &$crate::EventMetadata {
                &self.metadata
            }
        }

        impl $crate::FromPayload for $name {
            type Payload = $payload;

            fn from_payload(data: $payload, metadata: $crate::EventMetadata) -> Self {
                Self { data, metadata }
            }
        }
    };
    ($(#[$attr:meta])* $vis:vis $name:ident) => {
        $crate::event!($(#[$attr])* $vis $name(()));
    };
}
