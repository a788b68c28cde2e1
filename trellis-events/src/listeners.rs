//! Live listener table and detachable handles.

use crate::error::EventHandlerError;
use crate::event::{Event, EventKind};
use crate::outcome::{EventHandler, IntoOutcome, Outcome};
use dashmap::DashMap;
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use trellis_core::SharedInstance;

type ErasedCallback = Arc<dyn Fn(&Arc<dyn Event>) -> Outcome + Send + Sync>;

/// A typed listener callback with reference identity.
///
/// Keep a clone around to remove the listener later with
/// [`EventService::remove_listener`](crate::EventService::remove_listener);
/// clones share the same identity.
pub struct Callback<E> {
    inner: Arc<dyn Fn(&E) -> Outcome + Send + Sync>,
}

impl<E: Event> Callback<E> {
    pub fn new<F, R>(handler: F) -> Self
    where
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        Self {
            inner: Arc::new(move |event: &E| handler(event).into_outcome()),
        }
    }

    /// Invoke the callback directly
    pub fn call(&self, event: &E) -> Outcome {
        (self.inner)(event)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl<E> Clone for Callback<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> fmt::Debug for Callback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("event", &std::any::type_name::<E>())
            .finish()
    }
}

/// A type-erased listener ready to be attached to an event kind.
pub struct Listener {
    kind: EventKind,
    callback: ErasedCallback,
    origin: Option<usize>,
    label: Option<Cow<'static, str>>,
}

impl Listener {
    /// Listener from a closure over the concrete event
    pub fn new<E, F, R>(handler: F) -> Self
    where
        E: Event,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let callback: ErasedCallback = Arc::new(move |event: &Arc<dyn Event>| {
            let event: &dyn Event = &**event;
            match event.downcast_ref::<E>() {
                Some(typed) => handler(typed).into_outcome(),
                None => Outcome::Failed(EventHandlerError::TypeMismatch {
                    expected: std::any::type_name::<E>(),
                    actual: event.event_name(),
                }),
            }
        });

        Self {
            kind: EventKind::of::<E>(),
            callback,
            origin: None,
            label: None,
        }
    }

    /// Listener from a [`Callback`], removable by that callback's identity
    pub fn from_callback<E: Event>(callback: &Callback<E>) -> Self {
        let inner = callback.clone();
        let mut listener = Self::new::<E, _, Outcome>(move |event: &E| inner.call(event));
        listener.origin = Some(callback.identity());
        listener
    }

    /// Listener bound to a method of a live instance
    pub fn from_method<C, E, R, M>(instance: Arc<C>, method: M) -> Self
    where
        C: Send + Sync + 'static,
        E: Event,
        R: IntoOutcome,
        M: Fn(&C, &E) -> R + Send + Sync + 'static,
    {
        Self::new::<E, _, R>(move |event: &E| method(&instance, event))
    }

    /// Like [`Listener::from_method`] for an instance resolved from the
    /// container. Returns `None` when the instance is not a `C`.
    pub fn from_instance<C, E, R, M>(instance: SharedInstance, method: M) -> Option<Self>
    where
        C: Send + Sync + 'static,
        E: Event,
        R: IntoOutcome,
        M: Fn(&C, &E) -> R + Send + Sync + 'static,
    {
        let instance = instance.downcast::<C>().ok()?;
        Some(Self::from_method(instance, method))
    }

    /// Listener driving an asynchronous [`EventHandler`]
    pub fn from_handler<E, H>(handler: Arc<H>) -> Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        let callback: ErasedCallback = Arc::new(move |event: &Arc<dyn Event>| {
            let handler = handler.clone();
            let event = event.clone();
            Outcome::Pending(Box::pin(async move {
                match (*event).downcast_ref::<E>() {
                    Some(typed) => handler.handle(typed).await,
                    None => Err(EventHandlerError::TypeMismatch {
                        expected: std::any::type_name::<E>(),
                        actual: event.event_name(),
                    }),
                }
            }))
        });

        Self {
            kind: EventKind::of::<E>(),
            callback,
            origin: None,
            label: Some(Cow::Borrowed(std::any::type_name::<H>())),
        }
    }

    /// Name shown in logs when this listener fails
    pub fn labeled(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish()
    }
}

/// One live registration.
pub(crate) struct Descriptor {
    id: u64,
    once: bool,
    kind: EventKind,
    callback: ErasedCallback,
    origin: Option<usize>,
    label: Option<Cow<'static, str>>,
    detached: AtomicBool,
}

impl Descriptor {
    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("<anonymous>")
    }

    pub(crate) fn invoke(&self, event: &Arc<dyn Event>) -> Outcome {
        (self.callback)(event)
    }

    /// Take the right to run this descriptor for one delivery.
    ///
    /// A `once` descriptor can be claimed a single time, ever.
    fn claim(&self) -> bool {
        if self.once {
            !self.detached.swap(true, Ordering::AcqRel)
        } else {
            !self.detached.load(Ordering::Acquire)
        }
    }

    fn is_attached(&self) -> bool {
        !self.detached.load(Ordering::Acquire)
    }
}

/// Per-kind ordered descriptor lists.
#[derive(Default)]
pub(crate) struct ListenerTable {
    kinds: DashMap<TypeId, Vec<Arc<Descriptor>>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, listener: Listener, once: bool) -> Arc<Descriptor> {
        let descriptor = Arc::new(Descriptor {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            once,
            kind: listener.kind,
            callback: listener.callback,
            origin: listener.origin,
            label: listener.label,
            detached: AtomicBool::new(false),
        });

        self.kinds
            .entry(descriptor.kind.id())
            .or_default()
            .push(descriptor.clone());

        descriptor
    }

    /// Copy of the current listeners of a kind, in registration order.
    ///
    /// Listeners run against the copy with no lock held, so they may freely
    /// call back into the table.
    pub(crate) fn snapshot(&self, kind: TypeId) -> Vec<Arc<Descriptor>> {
        self.kinds
            .get(&kind)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Claim a descriptor for delivery, unlinking it when it only fires once.
    pub(crate) fn claim(&self, descriptor: &Descriptor) -> bool {
        if !descriptor.claim() {
            return false;
        }
        if descriptor.once {
            self.unlink(descriptor.kind.id(), |d| d.id == descriptor.id);
        }
        true
    }

    /// Detach the descriptor with the given id. Returns whether it was live.
    pub(crate) fn remove(&self, kind: TypeId, id: u64) -> bool {
        self.unlink(kind, |d| d.id == id)
    }

    /// Detach the first descriptor created from the given callback identity.
    pub(crate) fn remove_by_origin(&self, kind: TypeId, origin: usize) -> bool {
        self.unlink(kind, |d| d.origin == Some(origin))
    }

    fn unlink(&self, kind: TypeId, predicate: impl Fn(&Descriptor) -> bool) -> bool {
        let removed = match self.kinds.get_mut(&kind) {
            Some(mut list) => match list.iter().position(|d| predicate(&**d)) {
                Some(index) => {
                    let descriptor = list.remove(index);
                    descriptor.detached.store(true, Ordering::Release);
                    true
                }
                None => false,
            },
            None => false,
        };

        self.kinds.remove_if(&kind, |_, list| list.is_empty());
        removed
    }

    pub(crate) fn count(&self, kind: TypeId) -> usize {
        self.kinds.get(&kind).map(|list| list.len()).unwrap_or(0)
    }

    pub(crate) fn total(&self) -> usize {
        self.kinds.iter().map(|entry| entry.value().len()).sum()
    }

    pub(crate) fn clear(&self) {
        for entry in self.kinds.iter() {
            for descriptor in entry.value() {
                descriptor.detached.store(true, Ordering::Release);
            }
        }
        self.kinds.clear();
    }
}

/// Detaches one specific listener.
///
/// Returned by `on`/`once`. Detaching is idempotent, and dropping the handle
/// leaves the listener attached.
pub struct ListenerHandle {
    table: Weak<ListenerTable>,
    descriptor: Weak<Descriptor>,
    kind: EventKind,
    id: u64,
    used: AtomicBool,
}

impl ListenerHandle {
    pub(crate) fn new(table: &Arc<ListenerTable>, descriptor: &Arc<Descriptor>) -> Self {
        Self {
            table: Arc::downgrade(table),
            descriptor: Arc::downgrade(descriptor),
            kind: descriptor.kind,
            id: descriptor.id,
            used: AtomicBool::new(false),
        }
    }

    /// Remove the listener this handle was issued for.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn detach(&self) -> bool {
        if self.used.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.table.upgrade() {
            Some(table) => table.remove(self.kind.id(), self.id),
            None => false,
        }
    }

    /// Whether the listener can still be invoked
    pub fn is_attached(&self) -> bool {
        self.descriptor
            .upgrade()
            .map(|d| d.is_attached())
            .unwrap_or(false)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use std::sync::atomic::AtomicUsize;

    event!(Ping(u32));
    event!(Pong);

    fn counting(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = counter.clone();
        Listener::new::<Ping, _, ()>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn ping(n: u32) -> Arc<dyn Event> {
        Arc::new(Ping::new(n))
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let table = ListenerTable::new();
        let a = table.insert(Listener::new::<Ping, _, ()>(|_| {}).labeled("a"), false);
        let b = table.insert(Listener::new::<Ping, _, ()>(|_| {}).labeled("b"), false);

        let labels: Vec<_> = table
            .snapshot(TypeId::of::<Ping>())
            .iter()
            .map(|d| d.label().to_string())
            .collect();
        assert_eq!(labels, ["a", "b"]);
        assert_ne!(a.id, b.id);
        assert!(table.snapshot(TypeId::of::<Pong>()).is_empty());
    }

    #[test]
    fn test_once_can_only_be_claimed_once() {
        let table = ListenerTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let descriptor = table.insert(counting(&counter), true);

        assert!(table.claim(&descriptor));
        assert!(!table.claim(&descriptor));
        assert_eq!(table.count(TypeId::of::<Ping>()), 0);
    }

    #[test]
    fn test_handle_detach_is_idempotent() {
        let table = Arc::new(ListenerTable::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let descriptor = table.insert(counting(&counter), false);
        let handle = ListenerHandle::new(&table, &descriptor);

        assert!(handle.is_attached());
        assert!(handle.detach());
        assert!(!handle.detach());
        assert!(!handle.is_attached());
        assert!(!table.claim(&descriptor));
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn test_handle_outlives_table() {
        let table = Arc::new(ListenerTable::new());
        let descriptor = table.insert(Listener::new::<Ping, _, ()>(|_| {}), false);
        let handle = ListenerHandle::new(&table, &descriptor);
        drop(descriptor);
        drop(table);

        assert!(!handle.is_attached());
        assert!(!handle.detach());
    }

    #[test]
    fn test_remove_by_origin_removes_first_match() {
        let table = ListenerTable::new();
        let callback = Callback::<Ping>::new(|_| ());
        table.insert(Listener::from_callback(&callback), false);
        table.insert(Listener::from_callback(&callback), false);

        assert!(table.remove_by_origin(TypeId::of::<Ping>(), callback.identity()));
        assert_eq!(table.count(TypeId::of::<Ping>()), 1);

        let stranger = Callback::<Ping>::new(|_| ());
        assert!(!table.remove_by_origin(TypeId::of::<Ping>(), stranger.identity()));
        assert!(callback.clone().identity() == callback.identity());
    }

    #[test]
    fn test_listener_rejects_other_kinds() {
        let listener = Listener::new::<Pong, _, ()>(|_| {});
        match (listener.callback)(&ping(1)) {
            Outcome::Failed(EventHandlerError::TypeMismatch { expected, .. }) => {
                assert!(expected.ends_with("Pong"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_from_instance_checks_type() {
        struct Audit;
        impl Audit {
            fn on_ping(&self, event: &Ping) -> Result<(), String> {
                if event.data == 0 {
                    return Err("zero".into());
                }
                Ok(())
            }
        }

        let instance: SharedInstance = Arc::new(Audit);
        let listener = Listener::from_instance::<Audit, Ping, _, _>(instance, Audit::on_ping)
            .unwrap();
        assert!(matches!((listener.callback)(&ping(1)), Outcome::Done));
        assert!(matches!((listener.callback)(&ping(0)), Outcome::Failed(_)));

        let wrong: SharedInstance = Arc::new(String::new());
        assert!(Listener::from_instance::<Audit, Ping, _, _>(wrong, Audit::on_ping).is_none());
    }
}
