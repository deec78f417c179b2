//! Allocation Counting Tests
//!
//! This binary installs the counting allocator, so every heap allocation made
//! while a window is open is counted. Tests run serially: a concurrent test
//! allocating inside another test's window would skew its counts.

use benchmeter::{
    Benchmark, BenchmarkConfiguration, BenchmarkSuite, CountingAllocator, MetricKind,
    PercentileSet, RunnerSettingsBuilder, SampleCollector, SnapshotProducer, StatisticsSet,
    SuiteRunner, Tracked, Verdict,
};
use benchmeter_core::hooks::{self, EventSource};
use benchmeter_core::thresholds::threshold_file_path;
use benchmeter_core::{BenchmarkError, CollectorConfig, MetricSnapshot, MetricWindow};
use serial_test::serial;
use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator::counting();

fn producer() -> SnapshotProducer<'static> {
    SnapshotProducer::global().unwrap()
}

fn end(mut window: MetricWindow<'_>) -> MetricSnapshot {
    window.end().unwrap()
}

#[test]
#[serial]
fn test_scaled_batches_count_every_allocation() {
    let config = CollectorConfig {
        warmup_iterations: 1,
        scaling_factor: 1000,
        max_duration: Duration::from_secs(60),
        max_iterations: 5000,
        metrics: vec![MetricKind::MallocCountTotal],
    };
    let collector = SampleCollector::new(producer(), config).unwrap();
    let mut statistics = StatisticsSet::with_metrics(collector.metrics()).unwrap();

    let summary = collector
        .run_infallible(
            || {
                black_box(Box::new(black_box(7u64)));
            },
            &mut statistics,
        )
        .unwrap();

    assert_eq!(summary.warmup_batches, 1);
    assert_eq!(summary.measured_batches, 4);
    assert_eq!(summary.total_iterations, 5000);
    assert_eq!(statistics.count(MetricKind::MallocCountTotal), 4);

    let percentiles = statistics.percentiles().unwrap();
    assert_eq!(
        percentiles[&MetricKind::MallocCountTotal],
        PercentileSet::constant(1000)
    );
}

#[test]
#[serial]
fn test_concurrent_allocations_are_all_counted() {
    const THREADS: usize = 4;
    const ALLOCATIONS: u64 = 2_500;

    let ready = Arc::new(Barrier::new(THREADS + 1));
    let start = Arc::new(Barrier::new(THREADS + 1));
    let done = Arc::new(Barrier::new(THREADS + 1));
    let exit = Arc::new(Barrier::new(THREADS + 1));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barriers = [ready.clone(), start.clone(), done.clone(), exit.clone()];
            thread::spawn(move || {
                let [ready, start, done, exit] = barriers;
                ready.wait();
                start.wait();
                for i in 0..ALLOCATIONS {
                    black_box(Box::new(black_box(i)));
                }
                done.wait();
                // Thread teardown frees memory; keep it out of the window
                exit.wait();
            })
        })
        .collect();

    let producer = producer();
    ready.wait();
    let window = producer
        .begin_window(&[MetricKind::MallocCountTotal, MetricKind::FreeCountTotal])
        .unwrap();
    start.wait();
    done.wait();
    let snapshot = end(window);
    exit.wait();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected = THREADS as u64 * ALLOCATIONS;
    assert_eq!(snapshot.get(MetricKind::MallocCountTotal), Some(expected));
    assert_eq!(snapshot.get(MetricKind::FreeCountTotal), Some(expected));
}

#[test]
#[serial]
fn test_retained_allocations_are_reported_as_leaked() {
    let mut kept: Vec<Box<u64>> = Vec::with_capacity(100);
    let producer = producer();

    let window = producer
        .begin_window(&[MetricKind::MemoryLeaked, MetricKind::AllocatedBytes])
        .unwrap();
    for i in 0..100u64 {
        kept.push(Box::new(black_box(i)));
    }
    let snapshot = end(window);

    assert_eq!(snapshot.get(MetricKind::MemoryLeaked), Some(100));
    assert_eq!(
        snapshot.get(MetricKind::AllocatedBytes),
        Some(100 * std::mem::size_of::<u64>() as u64)
    );
    drop(kept);
}

#[test]
#[serial]
fn test_nested_window_counts_into_enclosing_window() {
    let producer = producer();

    let outer = producer.begin_window(&[MetricKind::MallocCountTotal]).unwrap();
    let inner = producer.begin_window(&[MetricKind::MallocCountTotal]).unwrap();
    assert!(outer.owns(EventSource::Allocation));
    assert!(!inner.owns(EventSource::Allocation));

    for i in 0..50u64 {
        black_box(Box::new(black_box(i)));
    }
    let inner = end(inner);
    let outer = end(outer);

    assert_eq!(inner.get(MetricKind::MallocCountTotal), Some(50));
    assert!(outer.get(MetricKind::MallocCountTotal).unwrap() >= 50);
}

#[test]
#[serial]
fn test_balanced_handles_have_no_lifecycle_delta() {
    let producer = producer();
    let window = producer.begin_window(MetricKind::LIFECYCLE).unwrap();
    for i in 0..10u64 {
        let handle = Tracked::new(i);
        let first = handle.clone();
        let second = first.clone();
        black_box((*second, Tracked::handle_count(&handle)));
    }
    let snapshot = end(window);

    assert_eq!(snapshot.get(MetricKind::ObjectAllocCount), Some(10));
    assert_eq!(snapshot.get(MetricKind::RetainCount), Some(20));
    assert_eq!(snapshot.get(MetricKind::ReleaseCount), Some(30));
    assert_eq!(snapshot.get(MetricKind::RetainReleaseDelta), Some(0));
}

#[test]
#[serial]
fn test_runner_gates_on_allocation_thresholds() {
    let temp_dir = TempDir::new().unwrap();
    let path = threshold_file_path(temp_dir.path(), "Alloc", "boxed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{"mallocCountTotal": 100}"#).unwrap();

    let suite = |per_iteration: u64| {
        let config = BenchmarkConfiguration::default()
            .metrics(&[MetricKind::MallocCountTotal])
            .scaling_factor(100)
            .max_iterations(300)
            .max_duration(Duration::from_secs(60));
        BenchmarkSuite::new("Alloc").with(Benchmark::new("boxed", config, move || {
            for i in 0..per_iteration {
                black_box(Box::new(black_box(i)));
            }
        }))
    };

    let settings = || {
        RunnerSettingsBuilder::new()
            .thresholds_root(temp_dir.path().to_path_buf())
            .baseline_dir(temp_dir.path().join("baselines"))
            .build()
            .unwrap()
    };

    let passing = SuiteRunner::new(settings()).unwrap().run(&mut suite(1)).unwrap();
    assert_eq!(passing.verdict, Verdict::Pass);
    assert_eq!(
        passing.benchmarks[0].metrics[&MetricKind::MallocCountTotal].percentiles,
        PercentileSet::constant(100)
    );

    let failing = SuiteRunner::new(settings()).unwrap().run(&mut suite(2)).unwrap();
    assert_eq!(failing.verdict, Verdict::Fail);
    assert_eq!(
        failing.failure_lines(),
        vec!["Alloc.boxed: mallocCountTotal p90: measured 200, absolute threshold exceeded 100"]
    );
}

#[test]
#[serial]
fn test_global_hook_lifecycle_for_malloc_count() {
    let metric = MetricKind::MallocCountTotal;

    hooks::reset(metric);
    black_box(Box::new(1u64));
    assert_eq!(hooks::read(metric), 0);

    hooks::install(metric).unwrap();
    let err = hooks::install(metric).unwrap_err();
    assert!(matches!(
        err,
        BenchmarkError::AlreadyInstalled(EventSource::Allocation)
    ));

    black_box(Box::new(2u64));
    hooks::uninstall(metric);
    hooks::uninstall(metric);
    assert_eq!(hooks::read(metric), 1);

    black_box(Box::new(3u64));
    assert_eq!(hooks::read(metric), 1);

    hooks::install(metric).unwrap();
    assert_eq!(hooks::read(metric), 0);
    hooks::uninstall(metric);
}
