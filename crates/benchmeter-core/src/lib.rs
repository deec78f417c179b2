//! # Benchmeter Core
//!
//! Measurement pipeline for allocation-aware micro-benchmarks:
//!
//! - [`hooks`]: process-wide counters fed by an interposing global allocator
//!   and by [`Tracked`] handles
//! - [`window`]: measurement windows turning counter growth into snapshots
//! - [`collector`]: warmup and scaled, measured batches of a workload
//! - [`statistics`]: bounded-memory percentile estimation
//! - [`thresholds`] and [`comparison`]: pass/fail decisions against absolute
//!   and baseline-relative bounds
//!
//! A benchmark binary opts into counting by installing the shim:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: benchmeter_core::CountingAllocator = benchmeter_core::CountingAllocator::counting();
//! ```

pub mod collector;
pub mod comparison;
pub mod error;
pub mod hooks;
pub mod metric;
pub mod os_stats;
pub mod statistics;
pub mod thresholds;
pub mod window;

pub use collector::{CollectorConfig, RunSummary, Sample, SampleCollector, SampleSink};
pub use comparison::{
    Bound, Comparison, ComparisonResult, MetricPercentiles, Outcome, ThresholdComparator, Verdict,
};
pub use error::{BenchResult, BenchmarkError};
pub use hooks::{
    CountingAllocator, EventSink, EventSource, HookRegistry, InterposingAllocator,
    PassthroughAllocator, Tracked,
};
pub use metric::MetricKind;
pub use os_stats::OsStats;
pub use statistics::{Percentile, PercentileRecorder, PercentileSet, StatisticsSet};
pub use thresholds::{ThresholdSpec, Thresholds, load_thresholds, write_p90_thresholds};
pub use window::{MetricSnapshot, MetricWindow, SnapshotProducer};
