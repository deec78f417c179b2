//! # Benchmeter Harness
//!
//! Runs suites of benchmarks through the core measurement pipeline and
//! decides each one against thresholds and stored baselines.
//!
//! ## Components
//!
//! - **Benchmarks**: named workloads with their configuration, grouped by module
//! - **Runner**: filtering, caps, threshold resolution and baseline comparison
//! - **Baselines**: named percentile snapshots stored as JSON per benchmark
//! - **Reports**: text and JSON suite reports, Influx annotated CSV export
//!
//! ## Usage
//!
//! ```no_run
//! use benchmeter_harness::{
//!     Benchmark, BenchmarkConfiguration, BenchmarkSuite, RunnerSettingsBuilder, SuiteRunner,
//! };
//!
//! let mut suite = BenchmarkSuite::new("Parsing").with(Benchmark::new(
//!     "tokens",
//!     BenchmarkConfiguration::default().scaling_factor(100),
//!     || {
//!         std::hint::black_box("a b c".split(' ').count());
//!     },
//! ));
//!
//! let settings = RunnerSettingsBuilder::from_env()?.build()?;
//! let report = SuiteRunner::new(settings)?.run(&mut suite)?;
//! println!("{}", report.render_text());
//! # Ok::<(), benchmeter_harness::HarnessError>(())
//! ```

/// Named baseline storage
pub mod baseline;
pub mod benchmark;
/// Runner settings from the environment
pub mod config;
pub mod error;
/// Exporter configurations and the Influx exporter
pub mod export;
pub mod report;
pub mod runner;

pub use baseline::{BaselineError, BaselineRecord, BaselineStore, EnvironmentInfo};
pub use benchmark::{Benchmark, BenchmarkConfiguration, BenchmarkSuite, WorkloadError};
pub use config::{ConfigError, LogFormat, RunnerSettings, RunnerSettingsBuilder};
pub use error::HarnessError;
pub use export::{
    ExportConfiguration, ExportConfigurations, InfluxDataType, InfluxExportConfiguration,
    InfluxExporter,
};
pub use report::{BenchmarkReport, MetricReport, SuiteReport, write_report};
pub use runner::SuiteRunner;
