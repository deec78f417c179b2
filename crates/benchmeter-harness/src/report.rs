//! Run reports.

use crate::HarnessError;
use crate::export::ExportConfigurations;
use benchmeter_core::{
    Comparison, MetricKind, MetricPercentiles, Percentile, PercentileSet, RunSummary, Verdict,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Reduced results of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub percentiles: PercentileSet,
    pub samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

/// Everything measured and decided for one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub module: String,
    pub benchmark: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "ExportConfigurations::is_empty")]
    pub export: ExportConfigurations,
    pub summary: RunSummary,
    pub metrics: BTreeMap<MetricKind, MetricReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    pub comparison: Comparison,
}

impl BenchmarkReport {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.module, self.benchmark)
    }

    pub fn verdict(&self) -> Verdict {
        self.comparison.verdict
    }

    pub fn percentiles(&self) -> MetricPercentiles {
        self.metrics
            .iter()
            .map(|(metric, report)| (*metric, report.percentiles))
            .collect()
    }

    /// One line per failing metric and percentile.
    pub fn failure_lines(&self) -> Vec<String> {
        self.comparison
            .failures()
            .map(|failure| format!("{}: {}", self.full_name(), failure))
            .collect()
    }
}

/// Reports of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub benchmarks: Vec<BenchmarkReport>,
    pub verdict: Verdict,
}

impl SuiteReport {
    pub fn new(benchmarks: Vec<BenchmarkReport>) -> Self {
        let verdict = Verdict::combine(benchmarks.iter().map(BenchmarkReport::verdict));
        Self {
            generated_at: chrono::Utc::now(),
            benchmarks,
            verdict,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }

    pub fn failure_lines(&self) -> Vec<String> {
        self.benchmarks
            .iter()
            .flat_map(BenchmarkReport::failure_lines)
            .collect()
    }

    pub fn to_json(&self) -> Result<String, HarnessError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Serialization(format!("JSON serialization failed: {}", e)))
    }

    pub fn from_json(content: &str) -> Result<Self, HarnessError> {
        serde_json::from_str(content)
            .map_err(|e| HarnessError::Serialization(format!("Failed to parse report: {}", e)))
    }

    /// Human readable tables, one per benchmark.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for benchmark in &self.benchmarks {
            let _ = writeln!(
                out,
                "{} ({} batches x {} iterations)",
                benchmark.full_name(),
                benchmark.summary.measured_batches,
                scaling(benchmark)
            );

            let _ = write!(out, "{:<32}", "Metric");
            for percentile in Percentile::ALL {
                let _ = write!(out, "{:>12}", percentile.name());
            }
            let _ = writeln!(out, "{:>10}", "Samples");

            for (metric, report) in &benchmark.metrics {
                let label = format!("{} ({})", metric, metric.unit());
                let _ = write!(out, "{:<32}", label);
                for (_, value) in report.percentiles.iter() {
                    let _ = write!(out, "{:>12}", value);
                }
                let _ = writeln!(out, "{:>10}", report.samples);
            }

            let _ = writeln!(out, "Result: {}", benchmark.verdict());
            for line in benchmark.failure_lines() {
                let _ = writeln!(out, "  {}", line);
            }
            out.push('\n');
        }

        let failed = self
            .benchmarks
            .iter()
            .filter(|b| !b.verdict().is_pass())
            .count();
        let _ = writeln!(
            out,
            "{} benchmarks, {} failed: {}",
            self.benchmarks.len(),
            failed,
            self.verdict
        );
        out
    }
}

/// Write rendered report output to `path`.
pub fn write_report<P: AsRef<Path>>(path: P, content: &str) -> Result<(), HarnessError> {
    fs::write(path.as_ref(), content)
        .map_err(|e| HarnessError::Export(format!("Failed to write report file: {}", e)))
}

fn scaling(benchmark: &BenchmarkReport) -> u64 {
    let summary = &benchmark.summary;
    let batches = summary.warmup_batches + summary.measured_batches;
    if batches == 0 {
        0
    } else {
        summary.total_iterations / batches
    }
}
