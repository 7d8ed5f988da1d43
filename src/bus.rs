//! Signal bus: emit pipeline, subscription tables, middleware chain, replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{BusError, HandlerError};
use crate::executor::{ExecutorStats, HandlerExecutor, HandlerFn, SequentialExecutor};
use crate::signal::{BaseSignal, SignalPayload};
use crate::store::{NoopStore, SignalStore};
use crate::transport::{InProcessTransport, Transport};

/// Snapshot of bus-wide counters. Lifetime: starts at construction, never
/// reset by the bus itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub emitted: u64,
    pub handled: u64,
    pub errors: u64,
    pub handlers: usize,
    pub any_handlers: usize,
    pub middleware: usize,
}

/// Called whenever a handler (typed or any) throws. `label` is
/// `"type:<type>"` or `"any:<index>"`.
pub type OnErrorFn<P> = dyn Fn(&BaseSignal<P>, &str, &HandlerError) + Send + Sync;

/// Middleware receives the signal and a `next` continuation; not calling
/// `next` short-circuits everything downstream.
pub trait Middleware<P: SignalPayload>: Send + Sync {
    fn call(&self, signal: &BaseSignal<P>, next: NextFn<'_>) -> Result<(), BusError>;
}

pub type NextFn<'a> = Box<dyn FnOnce() -> Result<(), BusError> + 'a>;

impl<P, F> Middleware<P> for F
where
    P: SignalPayload,
    F: for<'a> Fn(&'a BaseSignal<P>, NextFn<'a>) -> Result<(), BusError> + Send + Sync,
{
    fn call(&self, signal: &BaseSignal<P>, next: NextFn<'_>) -> Result<(), BusError> {
        (self)(signal, next)
    }
}

/// Unsubscribe token returned by [`SignalBus::on`]/[`SignalBus::on_any`].
/// Idempotent: calling it twice removes exactly one registration — the
/// second call is a no-op.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn call(self) {
        (self.0)()
    }
}

struct Entry<P: SignalPayload> {
    id: u64,
    handler: Arc<HandlerFn<P>>,
}

struct Tables<P: SignalPayload> {
    type_handlers: HashMap<&'static str, Vec<Entry<P>>>,
    any_handlers: Vec<Entry<P>>,
    middleware: Vec<Arc<dyn Middleware<P>>>,
}

// Not `#[derive(Default)]`: the derive would add a spurious `P: Default`
// bound even though `P` only ever appears behind a `Vec`/`HashMap`.
impl<P: SignalPayload> Default for Tables<P> {
    fn default() -> Self {
        Self {
            type_handlers: HashMap::new(),
            any_handlers: Vec::new(),
            middleware: Vec::new(),
        }
    }
}

struct StatsCounters {
    emitted: AtomicU64,
    handled: AtomicU64,
    errors: AtomicU64,
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            emitted: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

struct BusInner<P: SignalPayload> {
    tables: Mutex<Tables<P>>,
    stats: StatsCounters,
    store: Arc<dyn SignalStore<P>>,
    transport: Arc<dyn Transport<P>>,
    executor: Arc<dyn HandlerExecutor<P>>,
    on_error: Option<Arc<OnErrorFn<P>>>,
    next_handler_id: AtomicU64,
}

impl<P: SignalPayload + 'static> BusInner<P> {
    /// The terminal dispatch step: typed handlers, then any-handlers, each
    /// in registration order. Handler failures are caught and counted; they
    /// never propagate.
    fn run_handlers(&self, signal: &BaseSignal<P>) {
        let (typed, any): (Vec<Arc<HandlerFn<P>>>, Vec<Arc<HandlerFn<P>>>) = {
            let tables = self.tables.lock().unwrap();
            let typed = tables
                .type_handlers
                .get(signal.signal_type())
                .map(|entries| entries.iter().map(|e| Arc::clone(&e.handler)).collect())
                .unwrap_or_default();
            let any = tables.any_handlers.iter().map(|e| Arc::clone(&e.handler)).collect();
            (typed, any)
        };

        for handler in &typed {
            self.invoke(handler, signal, &format!("type:{}", signal.signal_type()));
        }
        for (index, handler) in any.iter().enumerate() {
            self.invoke(handler, signal, &format!("any:{index}"));
        }
    }

    fn invoke(&self, handler: &Arc<HandlerFn<P>>, signal: &BaseSignal<P>, label: &str) {
        match self.executor.execute(handler.as_ref(), signal) {
            Ok(()) => {
                self.stats.handled.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::SeqCst);
                warn!(label, error = %err, "signal handler failed");
                if let Some(on_error) = &self.on_error {
                    on_error(signal, label, &HandlerError::new(err.to_string()));
                }
            }
        }
    }

    /// Fold the middleware snapshot into a chain at dispatch time rather
    /// than precomputing it at registration time, recursing by index so
    /// order is always read fresh from the current list.
    fn run_chain(&self, middleware: &[Arc<dyn Middleware<P>>], index: usize, signal: &BaseSignal<P>) -> Result<(), BusError> {
        match middleware.get(index) {
            Some(mw) => {
                let rest = middleware;
                let next: NextFn<'_> = Box::new(move || self.run_chain(rest, index + 1, signal));
                mw.call(signal, next)
            }
            None => {
                self.run_handlers(signal);
                Ok(())
            }
        }
    }

    fn dispatch(&self, signal: &BaseSignal<P>) -> Result<(), BusError> {
        let middleware = {
            let tables = self.tables.lock().unwrap();
            tables.middleware.clone()
        };
        self.run_chain(&middleware, 0, signal)
    }
}

/// Builder for [`SignalBus`] construction options.
pub struct SignalBusOptions<P: SignalPayload> {
    store: Arc<dyn SignalStore<P>>,
    transport: Arc<dyn Transport<P>>,
    executor: Arc<dyn HandlerExecutor<P>>,
    on_error: Option<Arc<OnErrorFn<P>>>,
}

impl<P: SignalPayload + 'static> Default for SignalBusOptions<P> {
    fn default() -> Self {
        Self {
            store: Arc::new(NoopStore),
            transport: Arc::new(InProcessTransport::new()),
            executor: Arc::new(SequentialExecutor::new()),
            on_error: None,
        }
    }
}

impl<P: SignalPayload + 'static> SignalBusOptions<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: impl SignalStore<P> + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Like [`Self::with_store`], but for a store the caller already holds
    /// behind an `Arc` (so it can be inspected after the bus is built).
    pub fn with_store_arc(mut self, store: Arc<dyn SignalStore<P>>) -> Self {
        self.store = store;
        self
    }

    pub fn with_transport(mut self, transport: impl Transport<P> + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_executor(mut self, executor: impl HandlerExecutor<P> + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&BaseSignal<P>, &str, &HandlerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

/// Typed, in-process signal bus. Cheaply cloneable — clones share the same
/// subscription tables, stats, store, transport and executor via an
/// internal `Arc`.
pub struct SignalBus<P: SignalPayload> {
    inner: Arc<BusInner<P>>,
}

impl<P: SignalPayload> Clone for SignalBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: SignalPayload + 'static> Default for SignalBus<P> {
    fn default() -> Self {
        Self::with_options(SignalBusOptions::default())
    }
}

impl<P: SignalPayload + 'static> SignalBus<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SignalBusOptions<P>) -> Self {
        let inner = Arc::new(BusInner {
            tables: Mutex::new(Tables::default()),
            stats: StatsCounters::default(),
            store: options.store,
            transport: Arc::clone(&options.transport),
            executor: options.executor,
            on_error: options.on_error,
            next_handler_id: AtomicU64::new(0),
        });

        // The bus installs exactly one subscription on the transport, at
        // construction, to drive its own dispatch pipeline.
        let dispatch_inner = Arc::clone(&inner);
        options
            .transport
            .subscribe(Box::new(move |signal| dispatch_inner.dispatch(signal)));

        Self { inner }
    }

    /// Emit a signal through the full pipeline: save, publish (which
    /// triggers internal dispatch), then ack.
    pub fn emit(&self, signal: BaseSignal<P>) -> Result<(), BusError> {
        self.inner.stats.emitted.fetch_add(1, Ordering::SeqCst);
        debug!(signal_id = %signal.id, signal_type = signal.signal_type(), "emitting signal");

        self.inner
            .store
            .save(&signal)
            .map_err(|e| BusError::store_save(e.to_string()))?;

        self.inner.transport.emit(&signal)?;

        self.inner
            .store
            .mark_acked(signal.id)
            .map_err(|e| BusError::store_ack(e.to_string()))?;

        Ok(())
    }

    /// Register a typed handler. Returns an idempotent unsubscribe.
    pub fn on<F>(&self, signal_type: &'static str, handler: F) -> Unsubscribe
    where
        F: Fn(&BaseSignal<P>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut tables = self.inner.tables.lock().unwrap();
            tables
                .type_handlers
                .entry(signal_type)
                .or_default()
                .push(Entry {
                    id,
                    handler: Arc::new(handler),
                });
        }
        let inner = Arc::clone(&self.inner);
        Unsubscribe(Box::new(move || {
            let mut tables = inner.tables.lock().unwrap();
            if let Some(entries) = tables.type_handlers.get_mut(signal_type) {
                if let Some(pos) = entries.iter().position(|e| e.id == id) {
                    entries.remove(pos);
                }
            }
        }))
    }

    /// Register a type-agnostic handler, run after typed handlers.
    pub fn on_any<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&BaseSignal<P>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut tables = self.inner.tables.lock().unwrap();
            tables.any_handlers.push(Entry {
                id,
                handler: Arc::new(handler),
            });
        }
        let inner = Arc::clone(&self.inner);
        Unsubscribe(Box::new(move || {
            let mut tables = inner.tables.lock().unwrap();
            if let Some(pos) = tables.any_handlers.iter().position(|e| e.id == id) {
                tables.any_handlers.remove(pos);
            }
        }))
    }

    /// Append middleware to the chain. No unregister by design; `clear` is
    /// the only removal.
    pub fn use_middleware(&self, middleware: impl Middleware<P> + 'static) {
        self.inner.tables.lock().unwrap().middleware.push(Arc::new(middleware));
    }

    /// Empty all subscription tables. Does not touch counters.
    pub fn clear(&self) {
        let mut tables = self.inner.tables.lock().unwrap();
        tables.type_handlers.clear();
        tables.any_handlers.clear();
        tables.middleware.clear();
    }

    /// Snapshot of bus-wide counters and subscription table sizes.
    pub fn stats(&self) -> BusStats {
        let tables = self.inner.tables.lock().unwrap();
        BusStats {
            emitted: self.inner.stats.emitted.load(Ordering::SeqCst),
            handled: self.inner.stats.handled.load(Ordering::SeqCst),
            errors: self.inner.stats.errors.load(Ordering::SeqCst),
            handlers: tables.type_handlers.values().map(Vec::len).sum(),
            any_handlers: tables.any_handlers.len(),
            middleware: tables.middleware.len(),
        }
    }

    /// Executor-level stats (queued/processing), exposed for observability.
    pub fn executor_stats(&self) -> ExecutorStats {
        self.inner.executor.stats()
    }

    /// Republish every unacked signal from the store through the transport
    /// (not through `emit`, so `save` is not re-invoked), then ack each.
    /// Returns the count. Ordering follows `get_unacked()`.
    pub fn replay(&self) -> Result<usize, BusError> {
        let unacked = self
            .inner
            .store
            .get_unacked()
            .map_err(|e| BusError::store_replay(e.to_string()))?;

        let count = unacked.len();
        for signal in unacked {
            self.inner.transport.emit(&signal)?;
            self.inner
                .store
                .mark_acked(signal.id)
                .map_err(|e| BusError::store_ack(e.to_string()))?;
        }
        Ok(count)
    }
}
