//! Real-time interval clock.
//!
//! Runs its ticking loop on a dedicated OS thread, signalled from the
//! owning thread via `crossbeam-channel` the same way the teacher wires up
//! its internal control channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::warn;

use crate::clock::{Clock, DriftWarningDetector, TickHandler};
use crate::error::{ClockError, HandlerError};
use crate::tick::{Tick, TickReason, TickStats, TickStatsAccumulator};

/// How the clock behaves when a handler (or thread scheduling) falls far
/// enough behind that one or more interval boundaries are missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Fixed-delay: the next tick is always `intervalMs` after the
    /// previous one *finished*. Never drops, never catches up; persistent
    /// handler overrun just slows the effective rate.
    Block,
    /// Fixed-rate: if one or more boundaries were missed while the handler
    /// ran, skip them and record them as dropped. The clock always catches
    /// back up to the current boundary immediately.
    Drop,
    /// Fixed-rate: if boundaries were missed, fire extra `Catchup` ticks
    /// (up to `max_catch_up_ticks`) to make up the difference instead of
    /// silently dropping them. Anything beyond the cap is dropped.
    Adaptive,
}

/// Called when a handler invocation fails. Never stops the clock.
pub type OnErrorFn = dyn Fn(&HandlerError) + Send + Sync;

/// Called once the drift-warning detector's consecutive-high-drift counter
/// reaches its threshold, and again on every subsequent tick while the run
/// stays high.
pub type OnDriftWarningFn = dyn Fn(i64) + Send + Sync;

/// Configuration for [`IntervalClock`], built with `with_*` methods mirroring
/// the teacher's `BacktestEngine` builder style.
pub struct IntervalClockOptions {
    interval_ms: i64,
    policy: BackpressurePolicy,
    max_catch_up_ticks: u64,
    on_error: Option<Arc<OnErrorFn>>,
    on_drift_warning: Option<Arc<OnDriftWarningFn>>,
}

impl IntervalClockOptions {
    /// `interval_ms` is validated at [`IntervalClock::start`], not here:
    /// building the options struct has no fallible constructor step.
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            policy: BackpressurePolicy::Block,
            max_catch_up_ticks: 3,
            on_error: None,
            on_drift_warning: None,
        }
    }

    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_catch_up_ticks(mut self, max_catch_up_ticks: u64) -> Self {
        self.max_catch_up_ticks = max_catch_up_ticks;
        self
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&HandlerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn with_on_drift_warning<F>(mut self, on_drift_warning: F) -> Self
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.on_drift_warning = Some(Arc::new(on_drift_warning));
        self
    }
}

impl Default for IntervalClockOptions {
    fn default() -> Self {
        Self::new(1000)
    }
}

enum ControlMsg {
    Stop,
}

/// Wall-clock-driven [`Clock`]. `start` spawns a thread; `stop` signals and
/// joins it.
pub struct IntervalClock {
    options: IntervalClockOptions,
    running: Arc<AtomicBool>,
    control_tx: Option<Sender<ControlMsg>>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<Mutex<TickStatsAccumulator>>,
    seq: Arc<AtomicU64>,
}

impl IntervalClock {
    pub fn new(options: IntervalClockOptions) -> Self {
        Self {
            options,
            running: Arc::new(AtomicBool::new(false)),
            control_tx: None,
            thread: None,
            stats: Arc::new(Mutex::new(TickStatsAccumulator::default())),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Clock for IntervalClock {
    fn start(&mut self, mut handler: Box<TickHandler>) -> Result<(), ClockError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ClockError::AlreadyRunning);
        }
        if self.options.interval_ms <= 0 {
            return Err(ClockError::InvalidInterval);
        }

        let interval_ms = self.options.interval_ms;
        let policy = self.options.policy;
        let max_catch_up_ticks = self.options.max_catch_up_ticks;
        let on_error = self.options.on_error.clone();
        let on_drift_warning = self.options.on_drift_warning.clone();
        let (control_tx, control_rx) = bounded::<ControlMsg>(1);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        stats.lock().unwrap().reset();
        let seq = Arc::clone(&self.seq);
        seq.store(0, Ordering::SeqCst);

        let thread = thread::Builder::new()
            .name("interval-clock".into())
            .spawn(move || {
                let callbacks = FireCallbacks {
                    on_error: on_error.as_deref(),
                    on_drift_warning: on_drift_warning.as_deref(),
                };
                run_loop(
                    interval_ms,
                    policy,
                    max_catch_up_ticks,
                    &control_rx,
                    &running,
                    &stats,
                    &seq,
                    &mut *handler,
                    &callbacks,
                );
            })
            .expect("failed to spawn interval clock thread");

        self.control_tx = Some(control_tx);
        self.thread = Some(thread);
        Ok(())
    }

    /// Idempotent: signals and joins the worker thread only if it's
    /// actually running, but always returns `Ok(())`.
    fn stop(&mut self) -> Result<(), ClockError> {
        if self.running.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(tx) = self.control_tx.take() {
                let _ = tx.send(ControlMsg::Stop);
            }
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
        Ok(())
    }

    fn stats(&self) -> TickStats {
        self.stats.lock().unwrap().snapshot()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn now(&self) -> i64 {
        now_millis()
    }

    fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

struct FireCallbacks<'a> {
    on_error: Option<&'a OnErrorFn>,
    on_drift_warning: Option<&'a OnDriftWarningFn>,
}

#[allow(clippy::too_many_arguments)]
fn fire_tick(
    handler: &mut TickHandler,
    stats: &Mutex<TickStatsAccumulator>,
    drift_detector: &mut DriftWarningDetector,
    callbacks: &FireCallbacks<'_>,
    seq_counter: &AtomicU64,
    seq: u64,
    reason: TickReason,
    drift_ms: i64,
    interval_ms: i64,
) {
    seq_counter.store(seq, Ordering::SeqCst);
    let tick = Tick {
        ts: now_millis(),
        seq,
        reason,
        drift: Some(drift_ms),
    };
    let started = Instant::now();
    let result = handler(tick);
    let elapsed_ms = started.elapsed().as_millis() as i64;

    {
        let mut guard = stats.lock().unwrap();
        guard.record_tick(tick.ts, Some(drift_ms));
        guard.record_handler_elapsed(elapsed_ms);
        if result.is_err() {
            guard.record_error();
        }
    }

    if let Err(err) = &result {
        warn!(seq, error = %err, "interval clock handler failed");
        if let Some(on_error) = callbacks.on_error {
            on_error(err);
        }
    }

    if drift_detector.observe(drift_ms, interval_ms) {
        warn!(seq, drift_ms, "interval clock sustained high drift");
        if let Some(on_drift_warning) = callbacks.on_drift_warning {
            on_drift_warning(drift_ms);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    interval_ms: i64,
    policy: BackpressurePolicy,
    max_catch_up_ticks: u64,
    control_rx: &crossbeam_channel::Receiver<ControlMsg>,
    running: &AtomicBool,
    stats: &Mutex<TickStatsAccumulator>,
    seq_counter: &AtomicU64,
    handler: &mut TickHandler,
    callbacks: &FireCallbacks<'_>,
) {
    let interval = Duration::from_millis(interval_ms as u64);
    let mut seq: u64 = 0;
    let mut next_deadline = Instant::now() + interval;
    let mut drift_detector = DriftWarningDetector::new();

    loop {
        let wait = next_deadline.saturating_duration_since(Instant::now());
        match control_rx.recv_timeout(wait) {
            Ok(ControlMsg::Stop) => break,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let fire_at = Instant::now();
                let behind_ms = fire_at
                    .saturating_duration_since(next_deadline)
                    .as_millis() as i64;

                match policy {
                    BackpressurePolicy::Block => {
                        seq += 1;
                        // Fixed delay reschedules from completion time, so
                        // drift is meaningless here; always report 0.
                        fire_tick(handler, stats, &mut drift_detector, callbacks, seq_counter, seq, TickReason::Interval, 0, interval_ms);
                        // The next deadline starts counting from when this
                        // tick's handler actually finished.
                        next_deadline = Instant::now() + interval;
                    }
                    BackpressurePolicy::Drop => {
                        let missed_extra = (behind_ms.max(0) as u64) / interval_ms.max(1) as u64;
                        if missed_extra > 0 {
                            stats.lock().unwrap().record_dropped(missed_extra);
                        }
                        seq += 1;
                        fire_tick(handler, stats, &mut drift_detector, callbacks, seq_counter, seq, TickReason::Interval, behind_ms, interval_ms);
                        next_deadline += interval * (missed_extra as u32 + 1);
                    }
                    BackpressurePolicy::Adaptive => {
                        let missed_extra = (behind_ms.max(0) as u64) / interval_ms.max(1) as u64;
                        let catch_up = missed_extra.min(max_catch_up_ticks);
                        let overflow = missed_extra - catch_up;
                        if overflow > 0 {
                            stats.lock().unwrap().record_dropped(overflow);
                        }
                        // The primary fire leads, bounded catch-up fires
                        // follow with the same computed drift.
                        seq += 1;
                        fire_tick(handler, stats, &mut drift_detector, callbacks, seq_counter, seq, TickReason::Interval, behind_ms, interval_ms);
                        for _ in 0..catch_up {
                            seq += 1;
                            fire_tick(handler, stats, &mut drift_detector, callbacks, seq_counter, seq, TickReason::Catchup, behind_ms, interval_ms);
                        }
                        next_deadline += interval * (missed_extra as u32 + 1);
                    }
                }
            }
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    /// Block policy never drops ticks even when the handler overruns the
    /// interval.
    #[test]
    fn block_policy_never_drops() {
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(20).with_backpressure(BackpressurePolicy::Block),
        );
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        clock
            .start(Box::new(move |_tick| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(110));
        clock.stop().unwrap();

        let stats = clock.stats();
        assert_eq!(stats.dropped_ticks, 0);
        assert!(stats.tick_count >= 3);
    }

    /// Drop policy records skipped boundaries when a handler stalls past
    /// multiple intervals.
    #[test]
    fn drop_policy_records_dropped_ticks_after_a_stall() {
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(15).with_backpressure(BackpressurePolicy::Drop),
        );
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        clock
            .start(Box::new(move |_tick| {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    thread::sleep(Duration::from_millis(80));
                }
                Ok(())
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(120));
        clock.stop().unwrap();

        let stats = clock.stats();
        assert!(stats.dropped_ticks > 0, "expected at least one dropped tick, got {stats:?}");
    }

    /// Drop policy's skipped boundaries must not consume seq numbers: the
    /// ticks that do fire still form a gapless 1, 2, 3, ... sequence.
    #[test]
    fn drop_policy_keeps_emitted_seq_gapless() {
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(15).with_backpressure(BackpressurePolicy::Drop),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        clock
            .start(Box::new(move |tick| {
                s.lock().unwrap().push(tick.seq);
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    thread::sleep(Duration::from_millis(80));
                }
                Ok(())
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(120));
        clock.stop().unwrap();

        let seqs = seen.lock().unwrap().clone();
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected, "emitted seq must be gapless");
    }

    /// Adaptive fires bounded `Catchup` ticks instead of silently dropping,
    /// with the primary tick of each cycle carrying reason `Interval`.
    #[test]
    fn adaptive_policy_fires_catchup_ticks_with_primary_leading() {
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(15)
                .with_backpressure(BackpressurePolicy::Adaptive)
                .with_max_catch_up_ticks(3),
        );
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&reasons);
        let fired = Arc::new(AtomicU64::new(0));
        let f = Arc::clone(&fired);
        clock
            .start(Box::new(move |tick| {
                let n = f.fetch_add(1, Ordering::SeqCst);
                r.lock().unwrap().push(tick.reason);
                if n == 0 {
                    thread::sleep(Duration::from_millis(80));
                }
                Ok(())
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(120));
        clock.stop().unwrap();

        let seen = reasons.lock().unwrap();
        assert!(seen.contains(&TickReason::Catchup), "expected a catchup tick, got {seen:?}");
        assert_eq!(seen[0], TickReason::Interval);
    }

    #[test]
    fn on_error_callback_is_invoked_on_handler_failure() {
        let invoked = Arc::new(AtomicU64::new(0));
        let i = Arc::clone(&invoked);
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(10)
                .with_backpressure(BackpressurePolicy::Block)
                .with_on_error(move |_err| {
                    i.fetch_add(1, Ordering::SeqCst);
                }),
        );
        clock
            .start(Box::new(|_tick| Err(HandlerError::new("boom"))))
            .unwrap();
        thread::sleep(Duration::from_millis(55));
        clock.stop().unwrap();

        assert!(invoked.load(Ordering::SeqCst) > 0);
        assert!(clock.stats().errors > 0);
    }

    #[test]
    fn double_start_is_rejected_and_stop_without_start_is_a_noop() {
        let mut clock = IntervalClock::new(IntervalClockOptions::default());
        clock.stop().unwrap();
        clock.start(Box::new(|_t| Ok(()))).unwrap();
        assert_eq!(clock.start(Box::new(|_t| Ok(()))).unwrap_err(), ClockError::AlreadyRunning);
        clock.stop().unwrap();
        clock.stop().unwrap();
    }

    #[test]
    fn block_policy_reports_zero_drift() {
        let mut clock = IntervalClock::new(
            IntervalClockOptions::new(15).with_backpressure(BackpressurePolicy::Block),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        clock
            .start(Box::new(move |tick| {
                s.lock().unwrap().push(tick.drift);
                thread::sleep(Duration::from_millis(30));
                Ok(())
            }))
            .unwrap();
        thread::sleep(Duration::from_millis(80));
        clock.stop().unwrap();

        assert!(seen.lock().unwrap().iter().all(|d| *d == Some(0)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut clock = IntervalClock::new(IntervalClockOptions::new(0));
        assert_eq!(clock.start(Box::new(|_t| Ok(()))).unwrap_err(), ClockError::InvalidInterval);
    }
}
