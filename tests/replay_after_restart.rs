//! Simulates a process restart: one bus emits signals against a shared
//! store, a second bus (standing in for a fresh process) attaches to the
//! same store and replays whatever was never acked.

use std::sync::{Arc, Mutex};

use signalbus_core::{BaseSignal, SignalBus, SignalBusOptions, SignalPayload, SignalStore};
use signalbus_core::store::InMemoryStore;

#[derive(Debug, Clone, PartialEq)]
enum OrderPayload {
    Placed(u32),
    Cancelled(u32),
}

impl SignalPayload for OrderPayload {
    fn type_name(&self) -> &'static str {
        match self {
            OrderPayload::Placed(_) => "placed",
            OrderPayload::Cancelled(_) => "cancelled",
        }
    }
}

#[test]
fn unacked_signals_survive_a_restart_and_replay_in_order() {
    let store: Arc<InMemoryStore<OrderPayload>> = Arc::new(InMemoryStore::new());

    // First process: writes signals straight to the store (standing in for
    // a crash before the transport/handler stage ran).
    let a = BaseSignal::new(1, OrderPayload::Placed(1));
    let b = BaseSignal::new(2, OrderPayload::Placed(2));
    let c = BaseSignal::new(3, OrderPayload::Cancelled(1));
    store.save(&a).unwrap();
    store.save(&b).unwrap();
    store.save(&c).unwrap();

    // Second process: a fresh bus over the same store.
    let bus = SignalBus::<OrderPayload>::with_options(
        SignalBusOptions::new().with_store_arc(store.clone() as Arc<dyn SignalStore<OrderPayload>>),
    );

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delivered);
    bus.on_any(move |s| {
        d.lock().unwrap().push(s.payload.clone());
        Ok(())
    });

    let count = bus.replay().unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        *delivered.lock().unwrap(),
        vec![
            OrderPayload::Placed(1),
            OrderPayload::Placed(2),
            OrderPayload::Cancelled(1),
        ]
    );

    // A second replay finds nothing left unacked.
    assert_eq!(bus.replay().unwrap(), 0);
}
