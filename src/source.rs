//! External signal producers.
//!
//! A source is anything that calls back into a bus with freshly produced
//! signals on its own schedule — a clock (via [`crate::clock::adapter`]), a
//! socket listener, a file watcher. The bus doesn't know about sources
//! directly; callers wire a source's emit callback to [`crate::bus::SignalBus::emit`]
//! themselves.

use crate::error::{BusError, SourceError};
use crate::signal::SignalPayload;

/// Callback a source calls once per produced payload. Boxed and
/// `Send + Sync` because real-time sources (the interval clock) run their
/// production loop on a dedicated thread.
pub type EmitFn<P> = dyn Fn(P) -> Result<(), BusError> + Send + Sync;

/// An external producer of signal payloads.
///
/// `start`/`stop` are not reentrant-safe to call concurrently with each
/// other on the same source; callers are expected to serialize their own
/// lifecycle management (the clock adapter does this via the clock's own
/// `running` guard).
pub trait Source<P: SignalPayload>: Send {
    /// Stable, human-readable identifier, used in logs.
    fn name(&self) -> &str;

    /// Begin producing. Calling `start` on an already-started source
    /// returns [`SourceError::AlreadyStarted`] without side effects.
    fn start(&mut self, emit: Box<EmitFn<P>>) -> Result<(), SourceError>;

    /// Stop producing. Idempotent: calling `stop` on a source that isn't
    /// running is a no-op, not an error.
    fn stop(&mut self) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Payload(u32);
    impl SignalPayload for Payload {
        fn type_name(&self) -> &'static str {
            "payload"
        }
    }

    /// Minimal source used to pin down the double-start / idempotent-stop
    /// contract; real sources (the clock adapter) follow the same shape.
    struct ManualSource {
        running: bool,
        emitted: Arc<AtomicU32>,
        stopped_calls: Arc<AtomicBool>,
    }

    impl Source<Payload> for ManualSource {
        fn name(&self) -> &str {
            "manual"
        }

        fn start(&mut self, emit: Box<EmitFn<Payload>>) -> Result<(), SourceError> {
            if self.running {
                return Err(SourceError::AlreadyStarted);
            }
            self.running = true;
            emit(Payload(1)).map_err(|_| SourceError::AlreadyStarted).ok();
            self.emitted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), SourceError> {
            self.running = false;
            self.stopped_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn double_start_is_rejected() {
        let mut source = ManualSource {
            running: false,
            emitted: Arc::new(AtomicU32::new(0)),
            stopped_calls: Arc::new(AtomicBool::new(false)),
        };
        source.start(Box::new(|_p| Ok(()))).unwrap();
        let result = source.start(Box::new(|_p| Ok(())));
        assert_eq!(result.unwrap_err(), SourceError::AlreadyStarted);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut source = ManualSource {
            running: true,
            emitted: Arc::new(AtomicU32::new(0)),
            stopped_calls: Arc::new(AtomicBool::new(false)),
        };
        source.stop().unwrap();
        source.stop().unwrap();
        assert_eq!(source.stopped_calls.load(Ordering::SeqCst), 2);
    }
}
