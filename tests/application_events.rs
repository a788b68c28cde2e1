//! Integration tests for an application wired with the events module.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use trellis::prelude::*;
use trellis::trellis_config::ConfigManager;

#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub total_cents: u64,
}

event!(pub OrderPlaced(Order));
event!(pub OrderShipped(u64));

/// Publishes order events
struct OrderDesk {
    events: Arc<EventService>,
}

impl Publisher for OrderDesk {
    fn events(&self) -> &EventService {
        &self.events
    }
}

impl OrderDesk {
    fn place(self: &Arc<Self>, id: u64, total_cents: u64) {
        self.publish_shared::<OrderPlaced>(Order { id, total_cents });
    }
}

/// Declared listener class receiving both order events
#[derive(Default)]
struct Ledger {
    lines: Arc<Mutex<Vec<String>>>,
}

#[event_handlers(crate = ::trellis::events)]
impl Ledger {
    #[on_event]
    fn record_order(&self, event: &OrderPlaced) -> Outcome {
        let lines = self.lines.clone();
        let order = event.data.clone();
        let from_desk = event
            .metadata
            .source
            .as_ref()
            .is_some_and(|source| source.is::<OrderDesk>());

        Outcome::deferred(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            lines.lock().push(format!(
                "order {} {} desk={}",
                order.id, order.total_cents, from_desk
            ));
        })
    }

    #[on_event]
    fn record_shipment(&self, event: &OrderShipped) {
        self.lines.lock().push(format!("shipped {}", event.data));
    }
}

async fn app_with_events() -> (Application, Arc<EventService>, Arc<Ledger>) {
    let app = Application::builder().build();
    let ledger = app.container().register(Ledger::default());

    let config = ConfigManager::with_prefix("SHOP");
    config.load_vars(vec![(
        "SHOP_EVENTS_DRAIN_TIMEOUT_MS".to_string(),
        "5000".to_string(),
    )]);
    config.provide(app.container());

    let events = EventsModule::from_config(&app).await.unwrap();
    (app, events, ledger)
}

#[tokio::test]
async fn test_declared_listeners_are_wired_on_start() {
    let (app, events, ledger) = app_with_events().await;
    assert_eq!(events.config().drain_timeout, Some(Duration::from_secs(5)));
    assert_eq!(events.declared_count(), 0);

    app.start().await.unwrap();
    assert_eq!(events.declared_count(), 2);

    events.emit_payload::<OrderShipped>(7);
    assert_eq!(*ledger.lines.lock(), ["shipped 7"]);

    app.close(None).await.unwrap();
}

#[tokio::test]
async fn test_close_waits_for_deferred_listener_work() {
    let (app, events, ledger) = app_with_events().await;
    app.start().await.unwrap();

    let desk = Arc::new(OrderDesk {
        events: events.clone(),
    });
    desk.place(1, 1999);
    desk.place(2, 500);
    assert!(ledger.lines.lock().is_empty());
    assert_eq!(events.pending_count(), 2);

    app.close(Some("SIGTERM".to_string())).await.unwrap();

    let mut lines = ledger.lines.lock().clone();
    lines.sort();
    assert_eq!(lines, ["order 1 1999 desk=true", "order 2 500 desk=true"]);
}

#[tokio::test]
async fn test_ad_hoc_listeners_alongside_declared_ones() {
    let (app, events, ledger) = app_with_events().await;
    app.start().await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = events.once(move |event: &OrderShipped| sink.lock().push(event.data));

    events.emit_payload::<OrderShipped>(1);
    events.emit_payload::<OrderShipped>(2);

    assert_eq!(*seen.lock(), [1]);
    assert!(!handle.is_attached());
    assert_eq!(*ledger.lines.lock(), ["shipped 1", "shipped 2"]);

    app.close(None).await.unwrap();
}

#[tokio::test]
async fn test_start_fails_without_listener_instance() {
    let app = Application::builder().build();
    EventsModule::for_root(&app, EventServiceConfig::default()).await;

    let err = app.start().await.unwrap_err();
    assert!(err.to_string().contains("Ledger"));
}
