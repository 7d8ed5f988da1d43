//! External-push clock.
//!
//! Wraps an external notification source (a webhook, a message queue poll)
//! where ticks aren't on any internal schedule: `push` fires exactly one
//! tick right now, timestamped with the real wall clock. Collapsed into
//! this crate's synchronous model, `push` simply runs the handler before
//! returning — there's no separate completion signal to await.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::clock::{Clock, TickHandler};
use crate::error::ClockError;
use crate::tick::{Tick, TickReason, TickStats, TickStatsAccumulator};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct BridgeClock {
    running: bool,
    seq: u64,
    handler: Option<Box<TickHandler>>,
    stats: TickStatsAccumulator,
}

impl BridgeClock {
    pub fn new() -> Self {
        Self {
            running: false,
            seq: 0,
            handler: None,
            stats: TickStatsAccumulator::default(),
        }
    }

    /// Push one externally-sourced tick, timestamped with the current wall
    /// clock. A silent no-op if the clock isn't running or has no handler
    /// registered.
    pub fn push(&mut self) {
        if !self.running {
            return;
        }
        let Some(handler) = self.handler.as_mut() else {
            return;
        };
        self.seq += 1;
        let ts = now_millis();
        let tick = Tick {
            ts,
            seq: self.seq,
            reason: TickReason::Bridge,
            drift: None,
        };
        self.stats.record_tick(ts, None);
        if handler(tick).is_err() {
            self.stats.record_error();
        }
    }
}

impl Default for BridgeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BridgeClock {
    fn start(&mut self, handler: Box<TickHandler>) -> Result<(), ClockError> {
        if self.running {
            return Err(ClockError::AlreadyRunning);
        }
        self.running = true;
        self.seq = 0;
        self.stats.reset();
        self.handler = Some(handler);
        Ok(())
    }

    /// Idempotent: calling `stop` when not running is a no-op, never an
    /// error.
    fn stop(&mut self) -> Result<(), ClockError> {
        if self.running {
            self.running = false;
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
        now_millis()
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}
