//! Hot path benchmarks for signalbus-core.
//!
//! - Bus emit/dispatch latency with a growing number of handlers
//! - Middleware chain overhead
//! - Clock tick fan-out (test clock, no thread/timer noise)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use signalbus_core::{BaseSignal, Clock, NextFn, SignalBus, SignalPayload, TestClock};

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Tick(u64),
}

impl SignalPayload for Payload {
    fn type_name(&self) -> &'static str {
        "tick"
    }
}

/// Benchmark: single emit through an empty bus (save/transport/ack only).
fn bench_emit_no_handlers(c: &mut Criterion) {
    let bus = SignalBus::<Payload>::new();
    c.bench_function("emit_no_handlers", |b| {
        b.iter(|| {
            bus.emit(black_box(BaseSignal::new(0, Payload::Tick(0)))).unwrap();
        })
    });
}

/// Benchmark: emit fan-out cost as handler count grows.
fn bench_emit_handler_fanout(c: &mut Criterion) {
    let handler_counts = [1, 10, 100];

    let mut group = c.benchmark_group("emit_handler_fanout");
    for count in handler_counts {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let bus = SignalBus::<Payload>::new();
            for _ in 0..count {
                bus.on("tick", |_s| Ok(()));
            }
            b.iter(|| {
                bus.emit(black_box(BaseSignal::new(0, Payload::Tick(0)))).unwrap();
            })
        });
    }
    group.finish();
}

/// Benchmark: middleware chain overhead as chain length grows.
fn bench_middleware_chain(c: &mut Criterion) {
    let chain_lengths = [0, 5, 20];

    let mut group = c.benchmark_group("middleware_chain");
    for len in chain_lengths {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let bus = SignalBus::<Payload>::new();
            for _ in 0..len {
                bus.use_middleware(|_s: &BaseSignal<Payload>, next: NextFn<'_>| next());
            }
            bus.on("tick", |_s| Ok(()));
            b.iter(|| {
                bus.emit(black_box(BaseSignal::new(0, Payload::Tick(0)))).unwrap();
            })
        });
    }
    group.finish();
}

/// Benchmark: test clock tick throughput (pure virtual-time scheduling
/// cost, no thread or OS timer involved).
fn bench_test_clock_advance(c: &mut Criterion) {
    c.bench_function("test_clock_advance_1000_ticks", |b| {
        b.iter(|| {
            let mut clock = TestClock::new(1);
            clock.start(Box::new(|_tick| Ok(()))).unwrap();
            clock.advance_by(black_box(1000)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_emit_no_handlers,
    bench_emit_handler_fanout,
    bench_middleware_chain,
    bench_test_clock_advance,
);

criterion_main!(benches);
