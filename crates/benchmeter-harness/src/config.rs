//! # Runner Settings
//!
//! Settings shared by every benchmark of a run, loaded from the environment
//! and overridable from the command line.
//!
//! ## Environment Variables
//!
//! - `BENCHMETER_THRESHOLDS_DIR` - Root directory containing `Thresholds/` (default: current directory)
//! - `BENCHMETER_BASELINE_DIR` - Baseline store directory (default: `.benchmarkBaselines`)
//! - `BENCHMETER_BASELINE` - Baseline to compare against
//! - `BENCHMETER_FILTER` - Regex matched against `module.benchmark`
//! - `BENCHMETER_MAX_DURATION_MS` - Cap on every benchmark's measuring time
//! - `BENCHMETER_MAX_ITERATIONS` - Cap on every benchmark's iteration count
//! - `BENCHMETER_LOG_FORMAT` - `text` or `json` (default: `text`)

use regex::Regex;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_BASELINE_DIR: &str = ".benchmarkBaselines";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected text or json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Validated runner settings.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub thresholds_root: PathBuf,
    pub baseline_dir: PathBuf,
    pub baseline: Option<String>,
    pub filter: Option<Regex>,
    pub max_duration: Option<Duration>,
    pub max_iterations: Option<u64>,
    pub log_format: LogFormat,
}

impl RunnerSettings {
    /// Whether `module.benchmark` passes the filter.
    pub fn matches(&self, module: &str, benchmark: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.is_match(&format!("{module}.{benchmark}")),
            None => true,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            thresholds_root: PathBuf::from("."),
            baseline_dir: PathBuf::from(DEFAULT_BASELINE_DIR),
            baseline: None,
            filter: None,
            max_duration: None,
            max_iterations: None,
            log_format: LogFormat::Text,
        }
    }
}

/// Builder for [`RunnerSettings`] with environment variable support
#[derive(Debug, Clone, Default)]
pub struct RunnerSettingsBuilder {
    thresholds_root: Option<PathBuf>,
    baseline_dir: Option<PathBuf>,
    baseline: Option<String>,
    filter: Option<String>,
    max_duration: Option<Duration>,
    max_iterations: Option<u64>,
    log_format: LogFormat,
}

impl RunnerSettingsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(dir) = get_env_string("BENCHMETER_THRESHOLDS_DIR") {
            builder = builder.thresholds_root(PathBuf::from(dir));
        }
        if let Some(dir) = get_env_string("BENCHMETER_BASELINE_DIR") {
            builder = builder.baseline_dir(PathBuf::from(dir));
        }
        if let Some(name) = get_env_string("BENCHMETER_BASELINE") {
            builder = builder.baseline(name);
        }
        if let Some(filter) = get_env_string("BENCHMETER_FILTER") {
            builder = builder.filter(filter);
        }
        if let Some(millis) = get_env_u64("BENCHMETER_MAX_DURATION_MS")? {
            builder = builder.max_duration(Duration::from_millis(millis));
        }
        if let Some(iterations) = get_env_u64("BENCHMETER_MAX_ITERATIONS")? {
            builder = builder.max_iterations(iterations);
        }
        if let Some(format) = get_env_string("BENCHMETER_LOG_FORMAT") {
            let format = format
                .parse()
                .map_err(|message| ConfigError::InvalidEnvVar {
                    key: "BENCHMETER_LOG_FORMAT".to_string(),
                    message,
                })?;
            builder = builder.log_format(format);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn thresholds_root(mut self, dir: PathBuf) -> Self {
        self.thresholds_root = Some(dir);
        self
    }

    #[must_use]
    pub fn baseline_dir(mut self, dir: PathBuf) -> Self {
        self.baseline_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn baseline(mut self, name: impl Into<String>) -> Self {
        self.baseline = Some(name.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn build(self) -> Result<RunnerSettings, ConfigError> {
        if self.max_iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        if self.baseline.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "baseline name must not be empty".to_string(),
            ));
        }
        let filter = self
            .filter
            .map(|pattern| {
                Regex::new(&pattern).map_err(|e| {
                    ConfigError::ValidationError(format!("invalid filter '{pattern}': {e}"))
                })
            })
            .transpose()?;

        Ok(RunnerSettings {
            thresholds_root: self.thresholds_root.unwrap_or_else(|| PathBuf::from(".")),
            baseline_dir: self
                .baseline_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BASELINE_DIR)),
            baseline: self.baseline,
            filter,
            max_duration: self.max_duration,
            max_iterations: self.max_iterations,
            log_format: self.log_format,
        })
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match get_env_string(key) {
        Some(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        None => Ok(None),
    }
}
