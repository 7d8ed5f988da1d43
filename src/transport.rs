//! Fan-out delivery surface.
//!
//! The bus installs exactly one subscription at construction time (its own
//! internal dispatch closure). The default, [`InProcessTransport`], gives a
//! synchronous "observable" guarantee — `emit` doesn't return until every
//! subscriber has finished — by calling each subscriber inline, in
//! registration order, the way the teacher's `EventBus::publish` walks its
//! subscriber list (generalized here from `try_send`-and-drop into a direct
//! call so delivery is synchronous and lossless).

use std::sync::{Arc, Mutex};

use crate::error::BusError;
use crate::signal::{BaseSignal, SignalPayload};

/// A callback invoked with every signal delivered by the transport.
pub type TransportHandler<P> = dyn Fn(&BaseSignal<P>) -> Result<(), BusError> + Send + Sync;

/// Token returned by `subscribe`; calling it removes the subscription.
/// Idempotent: calling it twice is a no-op the second time.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn call(self) {
        (self.0)()
    }
}

/// Fan-out delivery surface. The bus only ever calls `subscribe` once, but
/// a custom transport may support and fan out to any number of external
/// subscribers.
pub trait Transport<P: SignalPayload>: Send + Sync {
    fn emit(&self, signal: &BaseSignal<P>) -> Result<(), BusError>;
    fn subscribe(&self, handler: Box<TransportHandler<P>>) -> Unsubscribe;
}

struct Subscriber<P: SignalPayload> {
    id: u64,
    handler: Box<TransportHandler<P>>,
}

/// Default in-process transport: sequential, synchronous fan-out to every
/// registered subscriber, in registration order.
pub struct InProcessTransport<P: SignalPayload> {
    subscribers: Arc<Mutex<Vec<Subscriber<P>>>>,
    next_id: Mutex<u64>,
}

impl<P: SignalPayload> Default for InProcessTransport<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: SignalPayload> InProcessTransport<P> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(0),
        }
    }
}

impl<P: SignalPayload + 'static> Transport<P> for InProcessTransport<P> {
    fn emit(&self, signal: &BaseSignal<P>) -> Result<(), BusError> {
        let subs = self.subscribers.lock().unwrap();
        for subscriber in subs.iter() {
            (subscriber.handler)(signal)?;
        }
        Ok(())
    }

    fn subscribe(&self, handler: Box<TransportHandler<P>>) -> Unsubscribe {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            id
        };
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber { id, handler });

        let subscribers = Arc::clone(&self.subscribers);
        Unsubscribe(Box::new(move || {
            subscribers.lock().unwrap().retain(|s| s.id != id);
        }))
    }
}
