//! Benchmark definitions.

use crate::export::ExportConfigurations;
use benchmeter_core::collector::duration_serde;
use benchmeter_core::{CollectorConfig, MetricKind, ThresholdSpec, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Error type returned by fallible workloads.
pub type WorkloadError = Box<dyn std::error::Error + Send + Sync>;

type Workload = Box<dyn FnMut() -> Result<(), WorkloadError> + Send>;

/// How a benchmark is run and judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfiguration {
    pub metrics: Vec<MetricKind>,
    pub warmup_iterations: u64,
    pub scaling_factor: u64,
    #[serde(with = "duration_serde")]
    pub max_duration: Duration,
    pub max_iterations: u64,
    /// Free-form labels, exported as Influx tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Replaces the threshold file when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
    #[serde(default, skip_serializing_if = "ExportConfigurations::is_empty")]
    pub export: ExportConfigurations,
}

impl Default for BenchmarkConfiguration {
    fn default() -> Self {
        Self {
            metrics: MetricKind::DEFAULT.to_vec(),
            warmup_iterations: 1,
            scaling_factor: 1,
            max_duration: Duration::from_secs(1),
            max_iterations: 10_000,
            tags: BTreeMap::new(),
            thresholds: None,
            export: ExportConfigurations::default(),
        }
    }
}

impl BenchmarkConfiguration {
    #[must_use]
    pub fn metrics(mut self, metrics: &[MetricKind]) -> Self {
        self.metrics = metrics.to_vec();
        self
    }

    #[must_use]
    pub fn warmup_iterations(mut self, warmup: u64) -> Self {
        self.warmup_iterations = warmup;
        self
    }

    #[must_use]
    pub fn scaling_factor(mut self, factor: u64) -> Self {
        self.scaling_factor = factor;
        self
    }

    #[must_use]
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = iterations;
        self
    }

    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Use `spec` for `metric` instead of the threshold file.
    #[must_use]
    pub fn threshold(mut self, metric: MetricKind, spec: ThresholdSpec) -> Self {
        self.thresholds
            .get_or_insert_with(Thresholds::new)
            .insert(metric, spec);
        self
    }

    #[must_use]
    pub fn export(mut self, export: ExportConfigurations) -> Self {
        self.export = export;
        self
    }

    /// Collector settings, with run-wide caps applied.
    pub fn collector_config(
        &self,
        max_duration_cap: Option<Duration>,
        max_iterations_cap: Option<u64>,
    ) -> CollectorConfig {
        CollectorConfig {
            warmup_iterations: self.warmup_iterations,
            scaling_factor: self.scaling_factor,
            max_duration: max_duration_cap.map_or(self.max_duration, |cap| cap.min(self.max_duration)),
            max_iterations: max_iterations_cap
                .map_or(self.max_iterations, |cap| cap.min(self.max_iterations)),
            metrics: self.metrics.clone(),
        }
    }
}

/// A named workload with its configuration.
pub struct Benchmark {
    name: String,
    configuration: BenchmarkConfiguration,
    workload: Workload,
}

impl Benchmark {
    pub fn new<F>(name: impl Into<String>, configuration: BenchmarkConfiguration, mut workload: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            name: name.into(),
            configuration,
            workload: Box::new(move || {
                workload();
                Ok(())
            }),
        }
    }

    /// A workload that may fail; the first error aborts the benchmark.
    pub fn fallible<F, E>(
        name: impl Into<String>,
        configuration: BenchmarkConfiguration,
        mut workload: F,
    ) -> Self
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: Into<WorkloadError>,
    {
        Self {
            name: name.into(),
            configuration,
            workload: Box::new(move || workload().map_err(Into::into)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configuration(&self) -> &BenchmarkConfiguration {
        &self.configuration
    }

    pub(crate) fn run_once(&mut self) -> Result<(), WorkloadError> {
        (self.workload)()
    }
}

impl fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

/// Benchmarks of one module.
#[derive(Debug)]
pub struct BenchmarkSuite {
    module: String,
    benchmarks: Vec<Benchmark>,
}

impl BenchmarkSuite {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            benchmarks: Vec::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn with(mut self, benchmark: Benchmark) -> Self {
        self.add(benchmark);
        self
    }

    pub fn add(&mut self, benchmark: Benchmark) {
        self.benchmarks.push(benchmark);
    }

    pub fn benchmarks(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    pub(crate) fn benchmarks_mut(&mut self) -> &mut [Benchmark] {
        &mut self.benchmarks
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}
