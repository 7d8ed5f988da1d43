//! Clock→Source adapter.
//!
//! Wraps any [`Clock`] plus a tick-to-payload mapping function so it can be
//! driven through the same [`Source`] lifecycle as any other producer.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{HandlerError, SourceError};
use crate::signal::SignalPayload;
use crate::source::{EmitFn, Source};
use crate::tick::Tick;

/// Adapts a [`Clock`] into a [`Source<P>`] by mapping each [`Tick`] to a
/// payload before forwarding it to the emit callback.
pub struct ClockSource<C: Clock, P: SignalPayload> {
    name: String,
    clock: C,
    to_payload: Arc<dyn Fn(Tick) -> P + Send + Sync>,
}

impl<C: Clock, P: SignalPayload + 'static> ClockSource<C, P> {
    pub fn new(
        name: impl Into<String>,
        clock: C,
        to_payload: impl Fn(Tick) -> P + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            clock,
            to_payload: Arc::new(to_payload),
        }
    }

    /// Access to the underlying clock, e.g. to call `TestClock::advance_by`
    /// in tests that drive virtual time through an adapted source.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

impl<C: Clock, P: SignalPayload + 'static> Source<P> for ClockSource<C, P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, emit: Box<EmitFn<P>>) -> Result<(), SourceError> {
        let to_payload = Arc::clone(&self.to_payload);
        self.clock.start(Box::new(move |tick| {
            let payload = to_payload(tick);
            emit(payload).map_err(|e| HandlerError::new(e.to_string()))
        }))?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.clock.stop()?;
        Ok(())
    }
}
