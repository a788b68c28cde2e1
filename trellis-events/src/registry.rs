//! Listener registry for declared event handler methods
//!
//! Maps a listener class to the `(method, event kind)` pairs it declares.
//! Entries come from two places:
//!
//! - explicit calls to [`ListenerRegistry::register`], or
//!   [`ListenerRegistry::declare`] for classes annotated with
//!   `#[event_handlers]`;
//! - the process-wide catalog that `#[event_handlers]` submits through
//!   `inventory`, exposed as [`ListenerRegistry::global`].
//!
//! The registry is pure metadata. Binding a declared method to a live
//! instance happens when the [`EventService`](crate::EventService) wires
//! declared listeners at startup.

use crate::event::{Event, EventKind};
use crate::listeners::Listener;
use crate::outcome::IntoOutcome;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use trellis_core::SharedInstance;

/// Binds a declared method to a resolved instance. Returns `None` when the
/// instance is not of the declaring class.
pub type Binder = Arc<dyn Fn(SharedInstance) -> Option<Listener> + Send + Sync>;

/// A listener class known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerClass {
    id: TypeId,
    name: &'static str,
}

impl ListenerClass {
    pub fn of<C: 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name of the class
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ListenerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&trellis_log::short_type_name(self.name))
    }
}

/// One declared `method -> event kind` mapping.
#[derive(Clone)]
pub struct ListenerBinding {
    method: &'static str,
    kind: EventKind,
    binder: Binder,
}

impl ListenerBinding {
    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Bind the method to a resolved instance
    pub fn bind(&self, instance: SharedInstance) -> Option<Listener> {
        (self.binder)(instance)
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("method", &self.method)
            .field("kind", &self.kind)
            .finish()
    }
}

struct ClassEntry {
    class: ListenerClass,
    methods: Vec<ListenerBinding>,
}

/// Catalog of declared event handler methods, per listener class.
#[derive(Default)]
pub struct ListenerRegistry {
    classes: Vec<ClassEntry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `C::method` handles events of kind `E`.
    ///
    /// The class entry is created on first use. Registering the same method
    /// name again replaces the previous mapping.
    pub fn register<C, E, R, M>(&mut self, method_name: &'static str, method: M) -> &mut Self
    where
        C: Send + Sync + 'static,
        E: Event,
        R: IntoOutcome,
        M: Fn(&C, &E) -> R + Clone + Send + Sync + 'static,
    {
        let binder: Binder = Arc::new(move |instance: SharedInstance| {
            Listener::from_instance::<C, E, R, M>(instance, method.clone())
        });
        self.insert(ListenerClass::of::<C>(), method_name, EventKind::of::<E>(), binder);
        self
    }

    /// Add every method a class declared with `#[event_handlers]`
    pub fn declare<C: DeclaresListeners>(&mut self) -> &mut Self {
        C::declare_listeners(self);
        self
    }

    /// Builder form of [`ListenerRegistry::declare`]
    pub fn with<C: DeclaresListeners>(mut self) -> Self {
        self.declare::<C>();
        self
    }

    fn insert(
        &mut self,
        class: ListenerClass,
        method: &'static str,
        kind: EventKind,
        binder: Binder,
    ) {
        let binding = ListenerBinding {
            method,
            kind,
            binder,
        };

        let index = match self.classes.iter().position(|entry| entry.class == class) {
            Some(index) => index,
            None => {
                self.classes.push(ClassEntry {
                    class,
                    methods: Vec::new(),
                });
                self.classes.len() - 1
            }
        };

        let methods = &mut self.classes[index].methods;
        match methods.iter_mut().find(|existing| existing.method == method) {
            Some(existing) => *existing = binding,
            None => methods.push(binding),
        }

        debug!(class = %class, method, event = %kind, "Registered event listener method");
    }

    /// Methods declared by `C`, in declaration order
    pub fn methods<C: 'static>(&self) -> &[ListenerBinding] {
        self.methods_of(TypeId::of::<C>())
    }

    /// Methods declared by the class with the given `TypeId`; empty if none
    pub fn methods_of(&self, class: TypeId) -> &[ListenerBinding] {
        self.classes
            .iter()
            .find(|entry| entry.class.id == class)
            .map(|entry| entry.methods.as_slice())
            .unwrap_or(&[])
    }

    /// Every class with at least one declared method, in registration order
    pub fn types(&self) -> Vec<ListenerClass> {
        self.classes.iter().map(|entry| entry.class).collect()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The process-wide registry of everything declared with
    /// `#[event_handlers]` in the running binary.
    ///
    /// Built on first access and read-only afterwards.
    pub fn global() -> Arc<ListenerRegistry> {
        GLOBAL.clone()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in &self.classes {
            let methods: Vec<_> = entry.methods.iter().map(|b| b.method).collect();
            map.entry(&entry.class.name, &methods);
        }
        map.finish()
    }
}

/// Implemented by `#[event_handlers]` for every annotated class.
pub trait DeclaresListeners: Send + Sync + 'static {
    fn declare_listeners(registry: &mut ListenerRegistry);
}

/// Definition-time declaration of one listener method, submitted by
/// `#[event_handlers]` and collected with `inventory`.
pub struct ListenerDeclaration {
    class: fn() -> ListenerClass,
    method: &'static str,
    kind: fn() -> EventKind,
    binder: fn(SharedInstance) -> Option<Listener>,
}

inventory::collect!(ListenerDeclaration);

impl ListenerDeclaration {
    pub const fn new<C: Send + Sync + 'static, E: Event>(
        method: &'static str,
        binder: fn(SharedInstance) -> Option<Listener>,
    ) -> Self {
        Self {
            class: ListenerClass::of::<C>,
            method,
            kind: EventKind::of::<E>,
            binder,
        }
    }
}

static GLOBAL: Lazy<Arc<ListenerRegistry>> = Lazy::new(|| {
    let mut registry = ListenerRegistry::new();
    for declaration in inventory::iter::<ListenerDeclaration> {
        let binder = declaration.binder;
        registry.insert(
            (declaration.class)(),
            declaration.method,
            (declaration.kind)(),
            Arc::new(binder),
        );
    }
    debug!(classes = registry.len(), "Built global listener registry");
    Arc::new(registry)
});
