//! Clock subsystem: a shared tick contract plus several implementations.
//! Real clocks ([`interval::IntervalClock`]) run their ticking loop on a
//! dedicated OS thread; the others are driven synchronously by the caller.

pub mod adapter;
pub mod bridge;
pub mod interval;
pub mod test_clock;

pub use adapter::ClockSource;
pub use bridge::BridgeClock;
pub use interval::{BackpressurePolicy, IntervalClock, IntervalClockOptions};
pub use test_clock::TestClock;

use crate::error::{ClockError, HandlerError};
use crate::tick::{Tick, TickStats};

/// Callback invoked once per [`Tick`]. Errors are recorded in
/// [`TickStats::errors`] and never stop the clock.
pub type TickHandler = dyn FnMut(Tick) -> Result<(), HandlerError> + Send;

/// The contract every clock implementation satisfies.
pub trait Clock: Send {
    /// Begin producing ticks, calling `handler` for each one. Starting an
    /// already-running clock returns [`ClockError::AlreadyRunning`].
    fn start(&mut self, handler: Box<TickHandler>) -> Result<(), ClockError>;

    /// Stop producing ticks. Idempotent: calling `stop` on a clock that
    /// isn't running is a no-op, never an error.
    fn stop(&mut self) -> Result<(), ClockError>;

    /// Snapshot of running counters, zeroed at every `start`.
    fn stats(&self) -> TickStats;

    fn is_running(&self) -> bool;

    /// Current time as this clock sees it: wall-clock millis for real
    /// clocks, virtual millis for the test clock.
    fn now(&self) -> i64;

    /// Seq number of the most recently fired tick (0 before any tick has
    /// fired since the last `start`).
    fn seq(&self) -> u64;
}

/// Tracks consecutive high-drift ticks and reports when a sustained drift
/// warning should fire (ratio 0.8, threshold 5 consecutive ticks).
pub(crate) struct DriftWarningDetector {
    ratio_threshold: f64,
    consecutive_threshold: u32,
    consecutive_high: u32,
}

impl DriftWarningDetector {
    pub fn new() -> Self {
        Self {
            ratio_threshold: 0.8,
            consecutive_threshold: 5,
            consecutive_high: 0,
        }
    }

    /// Record one tick's drift and return whether a warning is due this
    /// tick (fires once consecutive high-drift ticks reach the threshold,
    /// and keeps firing as long as the run stays high).
    pub fn observe(&mut self, drift_ms: i64, interval_ms: i64) -> bool {
        let ratio = if interval_ms > 0 {
            drift_ms.unsigned_abs() as f64 / interval_ms as f64
        } else {
            0.0
        };
        if ratio > self.ratio_threshold {
            self.consecutive_high += 1;
        } else {
            self.consecutive_high = 0;
        }
        self.consecutive_high >= self.consecutive_threshold
    }

    pub fn reset(&mut self) {
        self.consecutive_high = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_five_consecutive_high_drift_ticks() {
        let mut detector = DriftWarningDetector::new();
        for _ in 0..4 {
            assert!(!detector.observe(90, 100));
        }
        assert!(detector.observe(90, 100));
    }

    #[test]
    fn low_drift_resets_the_streak() {
        let mut detector = DriftWarningDetector::new();
        for _ in 0..4 {
            detector.observe(90, 100);
        }
        assert!(!detector.observe(10, 100));
        assert!(!detector.observe(90, 100));
    }
}
