//! Hook Overhead Benchmarks
//!
//! Cost of the measurement machinery itself: counting an event, allocating
//! through the counting shim, opening and closing a window, and recording
//! percentile samples.

use benchmeter::{CountingAllocator, MetricKind, SnapshotProducer, StatisticsSet};
use benchmeter_core::hooks::{EventSource, HookRegistry};
use benchmeter_core::window::SyscallOverhead;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator::counting();

/// Benchmark a single event against an inactive and an active hook
fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("hook_record");
    group.throughput(Throughput::Elements(1));

    let registry = HookRegistry::new();
    group.bench_function("inactive", |b| {
        b.iter(|| registry.record(black_box(EventSource::Retain), 0))
    });

    registry.install(EventSource::Retain).unwrap();
    group.bench_function("active", |b| {
        b.iter(|| registry.record(black_box(EventSource::Retain), 0))
    });
    registry.uninstall(EventSource::Retain);

    group.finish();
}

/// Benchmark allocations through the counting shim
fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("counting_allocator");
    let registry = HookRegistry::global();

    for size in [16usize, 1024] {
        group.bench_with_input(BenchmarkId::new("uncounted", size), &size, |b, &size| {
            b.iter(|| black_box(vec![0u8; size]))
        });

        registry.install_metric(MetricKind::MallocCountTotal).unwrap();
        group.bench_with_input(BenchmarkId::new("counted", size), &size, |b, &size| {
            b.iter(|| black_box(vec![0u8; size]))
        });
        registry.uninstall_metric(MetricKind::MallocCountTotal);
    }

    group.finish();
}

/// Benchmark opening and closing a measurement window
fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("window");
    group.measurement_time(Duration::from_secs(5));

    let registry = HookRegistry::new();
    let producer = SnapshotProducer::with_overhead(&registry, SyscallOverhead::default());

    group.bench_function("hooks_only", |b| {
        b.iter(|| {
            let mut window = producer
                .begin_window(&[MetricKind::MallocCountTotal, MetricKind::RetainCount])
                .unwrap();
            black_box(window.end().unwrap())
        })
    });

    group.bench_function("with_os_stats", |b| {
        b.iter(|| {
            let mut window = producer.begin_window(MetricKind::DEFAULT).unwrap();
            black_box(window.end().unwrap())
        })
    });

    group.finish();
}

/// Benchmark recording samples into the percentile engine
fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");
    group.throughput(Throughput::Elements(1_000));

    group.bench_function("record_1000", |b| {
        b.iter(|| {
            let mut statistics = StatisticsSet::new();
            for value in 0..1_000u64 {
                statistics
                    .record(MetricKind::WallClock, black_box(value * 1_337))
                    .unwrap();
            }
            black_box(statistics.percentiles().unwrap())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record,
    bench_allocation,
    bench_window,
    bench_statistics
);
criterion_main!(benches);
