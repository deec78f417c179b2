//! Error taxonomy for the measurement pipeline.
//!
//! Lifecycle misuse (`AlreadyInstalled`, `InvalidWindowState`) and
//! configuration problems (`NoSamples`, `Configuration`) are fatal for the
//! current run. Nothing in the core retries.

use crate::hooks::EventSource;
use std::path::PathBuf;

/// Result alias used throughout the core.
pub type BenchResult<T> = Result<T, BenchmarkError>;

/// Errors produced by the measurement core.
#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    #[error("Hook for {0} is already installed")]
    AlreadyInstalled(EventSource),

    #[error("Invalid window state: {0}")]
    InvalidWindowState(&'static str),

    #[error("No samples recorded")]
    NoSamples,

    #[error("Failed to decode thresholds from {path}: {source}")]
    ThresholdDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Workload failed in batch {batch}: {reason}")]
    WorkloadExecution { batch: u64, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("System call failed: {0}")]
    SystemCall(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BenchmarkError {
    /// Whether the error indicates misuse of the hook/window lifecycle.
    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(
            self,
            BenchmarkError::AlreadyInstalled(_) | BenchmarkError::InvalidWindowState(_)
        )
    }
}
