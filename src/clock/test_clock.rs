//! Virtual-time clock for deterministic tests.
//!
//! Grounded in the teacher's `TimerManager::set_time`/`process` pair
//! (`event_bus.rs`): time only moves when the caller says so, and every due
//! tick fires synchronously, in order, on the calling thread.
//!
//! Virtual time only ever advances in whole `interval_ms` steps, driven by
//! an accumulator: `advance_by` may hand it a number of milliseconds that
//! isn't an exact multiple of the interval, and the remainder carries over
//! to the next call (or to `flush`) instead of being folded into
//! `virtual_time` early. This is what keeps `virtual_time` equal to
//! `handler_calls * interval_ms` for any sequence of `advance_by` calls.

use crate::clock::{Clock, TickHandler};
use crate::error::{ClockError, HandlerError};
use crate::tick::TickStatsAccumulator;
use crate::tick::{Tick, TickReason, TickStats};

/// A clock with no wall-clock dependency: time is whatever the test last
/// set it to, moved forward only by [`TestClock::tick`], [`TestClock::advance_by`]
/// or [`TestClock::flush`].
pub struct TestClock {
    interval_ms: i64,
    virtual_time: i64,
    seq: u64,
    /// Pending elapsed milliseconds not yet folded into `virtual_time`.
    accumulator: i64,
    running: bool,
    handler: Option<Box<TickHandler>>,
    stats: TickStatsAccumulator,
}

impl TestClock {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            virtual_time: 0,
            seq: 0,
            accumulator: 0,
            running: false,
            handler: None,
            stats: TickStatsAccumulator::default(),
        }
    }

    /// Virtual time, in milliseconds, as of the last fired tick.
    pub fn now(&self) -> i64 {
        self.virtual_time
    }

    /// `floor(accumulator / intervalMs)`: how many ticks the next
    /// `advance_by`/`flush` call would have fired if given no further
    /// milliseconds.
    pub fn pending_ticks(&self) -> u64 {
        if self.interval_ms <= 0 {
            return 0;
        }
        (self.accumulator.max(0) as u64) / self.interval_ms as u64
    }

    /// Fire exactly `count` ticks, each advancing `virtual_time` by one
    /// `interval_ms` (`count = 0` is a true no-op). Unlike every other
    /// clock, handler errors are not swallowed: they're counted in
    /// `stats().errors` *and* returned, so tests can assert on a failing
    /// handler directly.
    pub fn tick(&mut self, count: u64) -> Result<(), ClockError> {
        if !self.running {
            return Err(ClockError::NotRunning);
        }
        for _ in 0..count {
            self.virtual_time += self.interval_ms;
            self.seq += 1;
            let ts = self.virtual_time;
            self.fire(ts, TickReason::Manual)
                .map_err(|e| ClockError::Handler(e.0))?;
        }
        Ok(())
    }

    /// Advance the accumulator by `ms` and fire one tick per whole interval
    /// boundary crossed; any remainder carries over to the next call.
    /// Handler errors are counted but swallowed, like every real clock.
    pub fn advance_by(&mut self, ms: i64) -> Result<(), ClockError> {
        if !self.running {
            return Err(ClockError::NotRunning);
        }
        self.accumulator += ms;
        while self.interval_ms > 0 && self.accumulator >= self.interval_ms {
            self.accumulator -= self.interval_ms;
            self.virtual_time += self.interval_ms;
            self.seq += 1;
            let ts = self.virtual_time;
            let _ = self.fire(ts, TickReason::Manual);
        }
        Ok(())
    }

    /// If any milliseconds are pending in the accumulator, fold them
    /// straight into `virtual_time` and fire one final tick.
    pub fn flush(&mut self) -> Result<(), ClockError> {
        if !self.running {
            return Err(ClockError::NotRunning);
        }
        if self.accumulator > 0 {
            self.virtual_time += self.accumulator;
            self.accumulator = 0;
            self.seq += 1;
            let ts = self.virtual_time;
            let _ = self.fire(ts, TickReason::Manual);
        }
        Ok(())
    }

    /// Zero `virtual_time`, `seq`, the accumulator, and all stats — the only
    /// operation that resets `virtual_time` (start/stop leave it alone).
    pub fn reset(&mut self) {
        self.virtual_time = 0;
        self.seq = 0;
        self.accumulator = 0;
        self.stats.reset();
    }

    fn fire(&mut self, ts: i64, reason: TickReason) -> Result<(), HandlerError> {
        let tick = Tick {
            ts,
            seq: self.seq,
            reason,
            drift: Some(0),
        };
        self.stats.record_tick(ts, Some(0));
        let started = std::time::Instant::now();
        let result = match self.handler.as_mut() {
            Some(handler) => handler(tick),
            None => Ok(()),
        };
        self.stats.record_handler_elapsed(started.elapsed().as_millis() as i64);
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }
}

impl Clock for TestClock {
    /// Registers `handler`; does not itself produce any ticks.
    fn start(&mut self, handler: Box<TickHandler>) -> Result<(), ClockError> {
        if self.running {
            return Err(ClockError::AlreadyRunning);
        }
        if self.interval_ms <= 0 {
            return Err(ClockError::InvalidInterval);
        }
        self.running = true;
        self.seq = 0;
        self.accumulator = 0;
        self.stats.reset();
        self.handler = Some(handler);
        Ok(())
    }

    /// Clears the handler and zeros the accumulator; `virtual_time`, `seq`
    /// and stats are left untouched (only `reset()` zeros those). Idempotent:
    /// calling `stop` when not running is a no-op, never an error.
    fn stop(&mut self) -> Result<(), ClockError> {
        if self.running {
            self.running = false;
            self.accumulator = 0;
            self.handler = None;
        }
        Ok(())
    }

    fn stats(&self) -> TickStats {
        self.stats.snapshot()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn now(&self) -> i64 {
        self.virtual_time
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}
