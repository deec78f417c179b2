//! Harness error types.

use crate::baseline::BaselineError;
use crate::config::ConfigError;
use benchmeter_core::BenchmarkError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Benchmark {benchmark} failed: {source}")]
    Benchmark {
        benchmark: String,
        #[source]
        source: BenchmarkError,
    },

    #[error(transparent)]
    Core(#[from] BenchmarkError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid benchmark filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Export error: {0}")]
    Export(String),
}

impl HarnessError {
    pub(crate) fn in_benchmark(benchmark: &str, source: BenchmarkError) -> Self {
        HarnessError::Benchmark {
            benchmark: benchmark.to_string(),
            source,
        }
    }

    /// The core error behind this one, if any.
    pub fn benchmark_error(&self) -> Option<&BenchmarkError> {
        match self {
            HarnessError::Benchmark { source, .. } => Some(source),
            HarnessError::Core(source) => Some(source),
            _ => None,
        }
    }
}
