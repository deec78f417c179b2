//! # Benchmeter
//!
//! Allocation-aware micro-benchmarks with percentile reduction and regression
//! gating. This crate re-exports the measurement pipeline from
//! [`benchmeter_core`] and the suite runner from [`benchmeter_harness`].

pub use benchmeter_core::{
    BenchmarkError, CountingAllocator, MetricKind, Percentile, PercentileSet, SampleCollector,
    SnapshotProducer, StatisticsSet, ThresholdComparator, ThresholdSpec, Thresholds, Tracked,
    Verdict,
};
pub use benchmeter_harness::{
    Benchmark, BenchmarkConfiguration, BenchmarkSuite, HarnessError, RunnerSettingsBuilder,
    SuiteReport, SuiteRunner,
};
