//! Typed in-process signal bus with pluggable transport, persistence and
//! handler execution, plus a clock subsystem for driving scheduled signal
//! production.
//!
//! The payload carried by a signal is a closed, user-defined enum
//! implementing [`signal::SignalPayload`]; [`bus::SignalBus`] is generic
//! over that payload type, so a single process can run independent buses
//! for unrelated signal families without any runtime type dispatch.

pub mod bus;
pub mod clock;
pub mod error;
pub mod executor;
pub mod signal;
pub mod source;
pub mod store;
pub mod tick;
pub mod transport;

pub use bus::{BusStats, Middleware, NextFn, SignalBus, SignalBusOptions, Unsubscribe as BusUnsubscribe};
pub use clock::{BackpressurePolicy, BridgeClock, Clock, ClockSource, IntervalClock, IntervalClockOptions, TestClock};
pub use error::{BusError, ClockError, HandlerError, SourceError, StoreError};
pub use executor::{ExecutorStats, HandlerExecutor, SequentialExecutor};
pub use signal::{BaseSignal, SignalId, SignalPayload};
pub use source::Source;
pub use store::{NoopStore, SignalStore};
#[cfg(feature = "sqlite-store")]
pub use store::SqliteStore;
pub use tick::{Tick, TickReason, TickStats};
pub use transport::{InProcessTransport, Transport};
