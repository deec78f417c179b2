//! Suite runner.
//!
//! Benchmarks run one after another: the hook registry is process-wide, so
//! two measurements in flight would count each other's events.

use crate::HarnessError;
use crate::baseline::BaselineStore;
use crate::benchmark::{Benchmark, BenchmarkSuite};
use crate::config::RunnerSettings;
use crate::report::{BenchmarkReport, MetricReport, SuiteReport};
use benchmeter_core::{
    BenchmarkError, SampleCollector, SnapshotProducer, StatisticsSet, ThresholdComparator,
    load_thresholds, write_p90_thresholds,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub struct SuiteRunner<'r> {
    settings: RunnerSettings,
    producer: SnapshotProducer<'r>,
    baselines: BaselineStore,
}

impl SuiteRunner<'static> {
    /// Runner measuring through the global hook registry.
    pub fn new(settings: RunnerSettings) -> Result<Self, HarnessError> {
        let producer = SnapshotProducer::global()?;
        Ok(Self::with_producer(settings, producer))
    }
}

impl<'r> SuiteRunner<'r> {
    pub fn with_producer(settings: RunnerSettings, producer: SnapshotProducer<'r>) -> Self {
        let baselines = BaselineStore::new(&settings.baseline_dir);
        Self {
            settings,
            producer,
            baselines,
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    /// Run every benchmark of `suite` that passes the filter.
    pub fn run(&self, suite: &mut BenchmarkSuite) -> Result<SuiteReport, HarnessError> {
        let reports = self.run_suite(suite)?;
        Ok(SuiteReport::new(reports))
    }

    /// Run several suites into one report.
    pub fn run_all(&self, suites: &mut [BenchmarkSuite]) -> Result<SuiteReport, HarnessError> {
        let mut reports = Vec::new();
        for suite in suites.iter_mut() {
            reports.extend(self.run_suite(suite)?);
        }
        Ok(SuiteReport::new(reports))
    }

    fn run_suite(&self, suite: &mut BenchmarkSuite) -> Result<Vec<BenchmarkReport>, HarnessError> {
        let module = suite.module().to_string();
        let mut reports = Vec::new();
        for benchmark in suite.benchmarks_mut() {
            if !self.settings.matches(&module, benchmark.name()) {
                debug!(module = %module, benchmark = %benchmark.name(), "Filtered out");
                continue;
            }
            reports.push(self.run_benchmark(&module, benchmark)?);
        }
        Ok(reports)
    }

    fn run_benchmark(
        &self,
        module: &str,
        benchmark: &mut Benchmark,
    ) -> Result<BenchmarkReport, HarnessError> {
        let name = benchmark.name().to_string();
        let full_name = format!("{module}.{name}");
        let configuration = benchmark.configuration().clone();
        let in_benchmark = |e: BenchmarkError| HarnessError::in_benchmark(&full_name, e);

        let thresholds = match &configuration.thresholds {
            Some(thresholds) => thresholds.clone(),
            None => load_thresholds(&self.settings.thresholds_root, module, &name)
                .map_err(in_benchmark)?,
        };

        let baseline = match &self.settings.baseline {
            Some(baseline) => {
                let record = self.baselines.load(baseline, module, &name)?;
                if record.is_none() {
                    warn!(benchmark = %full_name, baseline = %baseline, "No baseline record");
                }
                record
            }
            None => None,
        };

        let collector_config = configuration
            .collector_config(self.settings.max_duration, self.settings.max_iterations);
        let collector =
            SampleCollector::new(self.producer.clone(), collector_config).map_err(in_benchmark)?;
        let mut statistics = StatisticsSet::with_metrics(collector.metrics()).map_err(in_benchmark)?;

        info!(benchmark = %full_name, "Running benchmark");
        let summary = collector
            .run(|| benchmark.run_once(), &mut statistics)
            .map_err(in_benchmark)?;
        let percentiles = statistics.percentiles().map_err(in_benchmark)?;

        let mut comparator = ThresholdComparator::new(&thresholds);
        if let Some(record) = &baseline {
            comparator = comparator.with_baseline(&record.percentiles);
        }
        let comparison = comparator.compare(&percentiles);

        if comparison.is_pass() {
            info!(
                benchmark = %full_name,
                batches = summary.measured_batches,
                iterations = summary.total_iterations,
                "Benchmark passed"
            );
        } else {
            warn!(
                benchmark = %full_name,
                failures = comparison.failures().count(),
                "Benchmark exceeded thresholds"
            );
        }

        let metrics = percentiles
            .iter()
            .map(|(metric, set)| {
                let report = MetricReport {
                    percentiles: *set,
                    samples: statistics.count(*metric),
                    mean: statistics.mean(*metric),
                };
                (*metric, report)
            })
            .collect();

        Ok(BenchmarkReport {
            module: module.to_string(),
            benchmark: name,
            tags: configuration.tags,
            export: configuration.export,
            summary,
            metrics,
            baseline: baseline.map(|record| record.baseline),
            comparison,
        })
    }

    /// Store every benchmark of `report` under baseline `name`.
    pub fn save_baseline(&self, name: &str, report: &SuiteReport) -> Result<Vec<PathBuf>, HarnessError> {
        let mut paths = Vec::new();
        for benchmark in &report.benchmarks {
            paths.push(self.baselines.save(
                name,
                &benchmark.module,
                &benchmark.benchmark,
                &benchmark.percentiles(),
            )?);
        }
        info!(baseline = %name, benchmarks = paths.len(), "Saved baseline");
        Ok(paths)
    }

    /// Write the measured p90 values as the new threshold files.
    pub fn update_thresholds(&self, report: &SuiteReport) -> Result<Vec<PathBuf>, HarnessError> {
        let mut paths = Vec::new();
        for benchmark in &report.benchmarks {
            let path = write_p90_thresholds(
                &self.settings.thresholds_root,
                &benchmark.module,
                &benchmark.benchmark,
                &benchmark.percentiles(),
            )
            .map_err(|e| HarnessError::in_benchmark(&benchmark.full_name(), e))?;
            paths.push(path);
        }
        info!(files = paths.len(), "Updated thresholds");
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkConfiguration;
    use crate::config::RunnerSettingsBuilder;
    use benchmeter_core::{
        MetricKind, Outcome, Percentile, PercentileSet, ThresholdSpec, Tracked, Verdict,
    };
    use serial_test::serial;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(temp_dir: &TempDir) -> RunnerSettingsBuilder {
        RunnerSettingsBuilder::new()
            .thresholds_root(temp_dir.path().to_path_buf())
            .baseline_dir(temp_dir.path().join("baselines"))
    }

    fn lifecycle_config() -> BenchmarkConfiguration {
        BenchmarkConfiguration::default()
            .metrics(&[MetricKind::ObjectAllocCount, MetricKind::RetainCount])
            .warmup_iterations(1)
            .scaling_factor(100)
            .max_iterations(500)
            .max_duration(Duration::from_secs(60))
    }

    fn lifecycle_suite(config: BenchmarkConfiguration) -> BenchmarkSuite {
        BenchmarkSuite::new("Lifecycle").with(Benchmark::new("clone", config, || {
            let handle = Tracked::new(42u64);
            let copy = handle.clone();
            std::hint::black_box(*copy);
        }))
    }

    #[test]
    #[serial]
    fn test_run_reports_lifecycle_counts() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SuiteRunner::new(settings(&temp_dir).build().unwrap()).unwrap();

        let report = runner.run(&mut lifecycle_suite(lifecycle_config())).unwrap();
        assert_eq!(report.verdict, Verdict::Pass);

        let benchmark = &report.benchmarks[0];
        assert_eq!(benchmark.summary.measured_batches, 4);
        assert_eq!(
            benchmark.metrics[&MetricKind::ObjectAllocCount].percentiles,
            PercentileSet::constant(100)
        );
        assert_eq!(
            benchmark.metrics[&MetricKind::RetainCount].percentiles,
            PercentileSet::constant(100)
        );
        assert_eq!(benchmark.metrics[&MetricKind::WallClock].samples, 4);
    }

    #[test]
    #[serial]
    fn test_threshold_file_drives_verdict() {
        let temp_dir = TempDir::new().unwrap();
        let path = benchmeter_core::thresholds::threshold_file_path(temp_dir.path(), "Lifecycle", "clone");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"objectAllocCount": 99}"#).unwrap();

        let runner = SuiteRunner::new(settings(&temp_dir).build().unwrap()).unwrap();
        let report = runner.run(&mut lifecycle_suite(lifecycle_config())).unwrap();

        assert_eq!(report.verdict, Verdict::Fail);
        let failure = report.benchmarks[0].comparison.failures().next().unwrap();
        assert_eq!(failure.metric, MetricKind::ObjectAllocCount);
        assert_eq!(failure.percentile, Percentile::P90);
        assert_eq!(failure.outcome, Outcome::FailAbsolute);
    }

    #[test]
    #[serial]
    fn test_baseline_comparison_detects_relative_regression() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SuiteRunner::new(settings(&temp_dir).build().unwrap()).unwrap();
        let first = runner.run(&mut lifecycle_suite(lifecycle_config())).unwrap();
        runner.save_baseline("main", &first).unwrap();

        // Twice the retains per batch
        let config = lifecycle_config()
            .scaling_factor(200)
            .max_iterations(1000)
            .threshold(MetricKind::RetainCount, ThresholdSpec::standard());
        let runner = SuiteRunner::new(settings(&temp_dir).baseline("main").build().unwrap()).unwrap();
        let second = runner.run(&mut lifecycle_suite(config)).unwrap();

        assert_eq!(second.verdict, Verdict::Fail);
        assert_eq!(second.benchmarks[0].baseline.as_deref(), Some("main"));
        let failure = second.benchmarks[0].comparison.failures().next().unwrap();
        assert_eq!(failure.outcome, Outcome::FailRelative);
        assert_eq!(failure.deviation_percent, Some(100.0));
    }

    #[test]
    #[serial]
    fn test_filter_skips_benchmarks() {
        let temp_dir = TempDir::new().unwrap();
        let runner =
            SuiteRunner::new(settings(&temp_dir).filter("^Lifecycle\\.other$").build().unwrap())
                .unwrap();
        let report = runner.run(&mut lifecycle_suite(lifecycle_config())).unwrap();
        assert!(report.benchmarks.is_empty());
        assert!(report.is_pass());
    }

    #[test]
    #[serial]
    fn test_failing_workload_names_the_benchmark() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SuiteRunner::new(settings(&temp_dir).build().unwrap()).unwrap();
        let mut suite = BenchmarkSuite::new("Io").with(Benchmark::fallible(
            "broken",
            BenchmarkConfiguration::default(),
            || Err::<(), _>("connection refused"),
        ));

        let err = runner.run(&mut suite).unwrap_err();
        assert!(err.to_string().contains("Io.broken"));
        assert!(matches!(
            err.benchmark_error(),
            Some(BenchmarkError::WorkloadExecution { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_update_thresholds_writes_p90_files() {
        let temp_dir = TempDir::new().unwrap();
        let runner = SuiteRunner::new(settings(&temp_dir).build().unwrap()).unwrap();
        let report = runner.run(&mut lifecycle_suite(lifecycle_config())).unwrap();

        let paths = runner.update_thresholds(&report).unwrap();
        assert_eq!(paths.len(), 1);
        let thresholds =
            benchmeter_core::load_thresholds(temp_dir.path(), "Lifecycle", "clone").unwrap();
        assert_eq!(
            thresholds[&MetricKind::ObjectAllocCount].absolute[&Percentile::P90],
            100
        );
    }
}
