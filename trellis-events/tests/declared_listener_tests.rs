//! Declared listener classes wired through the container

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use trellis_core::{Application, Container};
use trellis_events::*;

event!(pub UserCreated(String));
event!(pub UserDeleted(String));

#[derive(Default)]
struct AuditTrail {
    entries: Mutex<Vec<String>>,
}

#[event_handlers]
impl AuditTrail {
    #[on_event]
    fn on_created(&self, event: &UserCreated) {
        self.entries.lock().push(format!("created {}", event.data));
    }

    #[on_event]
    fn on_deleted(&self, event: &UserDeleted) -> Result<(), EventHandlerError> {
        if event.data.is_empty() {
            return Err("missing user".into());
        }
        self.entries.lock().push(format!("deleted {}", event.data));
        Ok(())
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

#[derive(Default)]
struct WelcomeMailer {
    sent: Arc<Mutex<Vec<String>>>,
}

#[event_handlers]
impl WelcomeMailer {
    #[on_event]
    fn send_welcome(&self, event: &UserCreated) -> Outcome {
        let sent = self.sent.clone();
        let email = event.data.clone();
        Outcome::deferred(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sent.lock().push(email);
        })
    }
}

fn register_all(container: &Container) -> (Arc<AuditTrail>, Arc<WelcomeMailer>) {
    (
        container.register(AuditTrail::default()),
        container.register(WelcomeMailer::default()),
    )
}

#[test]
fn test_macro_declares_methods() {
    let registry = ListenerRegistry::new()
        .with::<AuditTrail>()
        .with::<WelcomeMailer>();

    let methods: Vec<_> = registry
        .methods::<AuditTrail>()
        .iter()
        .map(|binding| (binding.method(), binding.kind()))
        .collect();
    assert_eq!(
        methods,
        [
            ("on_created", EventKind::of::<UserCreated>()),
            ("on_deleted", EventKind::of::<UserDeleted>()),
        ]
    );
    assert_eq!(registry.methods::<WelcomeMailer>().len(), 1);
}

#[test]
fn test_global_registry_collects_declarations() {
    let registry = ListenerRegistry::global();

    let mut classes: Vec<_> = registry.types().iter().map(|c| c.to_string()).collect();
    classes.sort();
    assert_eq!(classes, ["AuditTrail", "WelcomeMailer"]);
    assert_eq!(registry.methods::<AuditTrail>().len(), 2);
}

#[test]
fn test_wiring_binds_resolved_instances() {
    let container = Container::new();
    let (audit, _) = register_all(&container);

    let events = EventService::builder()
        .registry(ListenerRegistry::new().with::<AuditTrail>())
        .container(&container)
        .build();

    assert_eq!(events.wire_declared().unwrap(), 2);
    assert_eq!(events.declared_count(), 2);

    events.emit_payload::<UserCreated>("ada".to_string());
    events.emit_payload::<UserDeleted>(String::new());
    events.emit_payload::<UserDeleted>("ada".to_string());

    assert_eq!(audit.entries(), ["created ada", "deleted ada"]);
}

#[test]
fn test_rewiring_detaches_previous_listeners() {
    let container = Container::new();
    let (audit, _) = register_all(&container);

    let events = EventService::builder()
        .registry(ListenerRegistry::new().with::<AuditTrail>())
        .container(&container)
        .build();

    events.wire_declared().unwrap();
    events.wire_declared().unwrap();
    assert_eq!(events.listener_count::<UserCreated>(), 1);

    events.emit_payload::<UserCreated>("grace".to_string());
    assert_eq!(audit.entries(), ["created grace"]);

    assert_eq!(events.detach_declared(), 2);
    assert_eq!(events.total_listeners(), 0);
}

#[test]
fn test_unresolvable_class_is_a_startup_error() {
    let container = Container::new();
    container.register(AuditTrail::default());

    let events = EventService::builder()
        .registry(
            ListenerRegistry::new()
                .with::<AuditTrail>()
                .with::<WelcomeMailer>(),
        )
        .container(&container)
        .build();

    let err = events.wire_declared().unwrap_err();
    assert!(matches!(err, EventError::ListenerNotResolvable { .. }));
    assert!(err.to_string().contains("WelcomeMailer"));

    // Nothing stays attached from a failed pass
    assert_eq!(events.total_listeners(), 0);
}

#[test]
fn test_declared_classes_need_a_container() {
    let events = EventService::builder()
        .registry(ListenerRegistry::new().with::<AuditTrail>())
        .build();

    assert!(matches!(events.wire_declared(), Err(EventError::NoContainer)));
}

#[tokio::test]
async fn test_application_lifecycle_with_global_registry() {
    let app = Application::builder().build();
    let (audit, mailer) = register_all(app.container());

    let events = EventsModule::for_root(&app, EventServiceConfig::default()).await;
    app.start().await.unwrap();
    assert_eq!(events.declared_count(), 3);

    events.emit_payload::<UserCreated>("linus".to_string());
    assert_eq!(audit.entries(), ["created linus"]);
    assert!(mailer.sent.lock().is_empty());

    app.close(Some("SIGTERM".to_string())).await.unwrap();
    assert_eq!(*mailer.sent.lock(), ["linus"]);
    assert_eq!(events.pending_count(), 0);
}

#[tokio::test]
async fn test_missing_listener_class_aborts_startup() {
    let app = Application::builder().build();
    app.container().register(AuditTrail::default());

    EventsModule::for_root(&app, EventServiceConfig::default()).await;

    assert!(app.start().await.is_err());
}
