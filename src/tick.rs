//! Tick data model shared by every clock.

/// Why a [`Tick`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReason {
    /// Regular scheduled fire.
    Interval,
    /// Extra fire issued to compensate for a delayed interval tick.
    Catchup,
    /// Fired by an explicit call (test clock).
    Manual,
    /// Fired by an external `push` (bridge clock).
    Bridge,
}

/// An immutable event produced by a clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Wall-clock millis for real clocks, virtual millis for the test clock.
    pub ts: i64,
    /// Monotonic, zero-based sequence number for the current `start` epoch.
    pub seq: u64,
    pub reason: TickReason,
    /// Signed deviation from the ideal fire time; only set for
    /// interval/catchup ticks.
    pub drift: Option<i64>,
}

/// Running counters and timing statistics for a clock, zeroed at every
/// `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickStats {
    pub tick_count: u64,
    pub dropped_ticks: u64,
    pub errors: u64,
    pub last_tick_at: Option<i64>,
    pub max_handler_ms: i64,
    pub avg_handler_ms: f64,
    pub avg_drift_ms: f64,
}

impl Default for TickStats {
    fn default() -> Self {
        Self {
            tick_count: 0,
            dropped_ticks: 0,
            errors: 0,
            last_tick_at: None,
            max_handler_ms: 0,
            avg_handler_ms: 0.0,
            avg_drift_ms: 0.0,
        }
    }
}

/// Mutable accumulator behind a [`TickStats`] snapshot. Kept separate from
/// the public snapshot type so internals (running sums used to compute the
/// two running means) aren't part of the public API.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TickStatsAccumulator {
    pub tick_count: u64,
    pub dropped_ticks: u64,
    pub errors: u64,
    pub last_tick_at: Option<i64>,
    pub max_handler_ms: i64,
    total_handler_ms: i64,
    total_drift_ms: i64,
    drift_samples: u64,
}

impl TickStatsAccumulator {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_tick(&mut self, ts: i64, drift: Option<i64>) {
        self.tick_count += 1;
        self.last_tick_at = Some(ts);
        if let Some(d) = drift {
            self.total_drift_ms += d.abs();
            self.drift_samples += 1;
        }
    }

    pub fn record_dropped(&mut self, count: u64) {
        self.dropped_ticks += count;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn record_handler_elapsed(&mut self, elapsed_ms: i64) {
        self.total_handler_ms += elapsed_ms;
        if elapsed_ms > self.max_handler_ms {
            self.max_handler_ms = elapsed_ms;
        }
    }

    pub fn snapshot(&self) -> TickStats {
        let avg_handler_ms = if self.tick_count > 0 {
            self.total_handler_ms as f64 / self.tick_count as f64
        } else {
            0.0
        };
        let avg_drift_ms = if self.drift_samples > 0 {
            self.total_drift_ms as f64 / self.drift_samples as f64
        } else {
            0.0
        };
        TickStats {
            tick_count: self.tick_count,
            dropped_ticks: self.dropped_ticks,
            errors: self.errors,
            last_tick_at: self.last_tick_at,
            max_handler_ms: self.max_handler_ms,
            avg_handler_ms,
            avg_drift_ms,
        }
    }
}
