//! Handler invocation policy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{BusError, HandlerError};
use crate::signal::{BaseSignal, SignalPayload};

/// Snapshot of an executor's in-flight work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub queued: usize,
    pub processing: usize,
}

/// A typed or any-handler callback registered on the bus.
pub type HandlerFn<P> = dyn Fn(&BaseSignal<P>) -> Result<(), HandlerError> + Send + Sync;

/// Handler invocation policy. The default runs handlers inline on the
/// caller's thread; a custom executor could hand invocations off to a
/// thread pool, as long as `execute` still blocks until the handler (or its
/// delegate) has resolved, preserving the bus's synchronous dispatch
/// contract.
pub trait HandlerExecutor<P: SignalPayload>: Send + Sync {
    fn execute(&self, handler: &HandlerFn<P>, signal: &BaseSignal<P>) -> Result<(), BusError>;
    fn stats(&self) -> ExecutorStats;
}

/// Default executor: runs the handler inline, propagating its error.
#[derive(Debug, Default)]
pub struct SequentialExecutor {
    processing: AtomicUsize,
}

impl SequentialExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: SignalPayload> HandlerExecutor<P> for SequentialExecutor {
    fn execute(&self, handler: &HandlerFn<P>, signal: &BaseSignal<P>) -> Result<(), BusError> {
        self.processing.fetch_add(1, Ordering::SeqCst);
        let result = handler(signal);
        self.processing.fetch_sub(1, Ordering::SeqCst);
        result.map_err(|e| BusError::handler(e.0))
    }

    fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            queued: 0,
            processing: self.processing.load(Ordering::SeqCst),
        }
    }
}
