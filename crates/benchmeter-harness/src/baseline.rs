//! Baseline Store
//!
//! Named baselines of percentile results, one JSON file per benchmark:
//! `<dir>/<baseline>/<module>.<benchmark>.json`.

use benchmeter_core::MetricPercentiles;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Stored results of one benchmark in one baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub baseline: String,
    pub module: String,
    pub benchmark: String,
    /// Timestamp when the record was written
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub environment: EnvironmentInfo,
    pub percentiles: MetricPercentiles,
}

/// Environment information for baseline context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub hostname: String,
    /// Operating system
    pub os: String,
    pub arch: String,
    /// CPU model
    pub cpu_info: String,
    /// Logical processors available to the process
    pub processors: usize,
    /// Total memory in MB
    pub total_memory_mb: u64,
    /// Additional environment variables or flags
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EnvironmentInfo {
    /// Capture current environment information
    pub fn capture() -> Self {
        Self {
            hostname: get_hostname(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_info: get_cpu_info(),
            processors: std::thread::available_parallelism().map_or(1, |n| n.get()),
            total_memory_mb: get_total_memory_mb(),
            metadata: HashMap::new(),
        }
    }
}

/// Baseline management errors
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Baseline not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Persists baselines under one directory
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, baseline: &str, module: &str, benchmark: &str) -> PathBuf {
        self.dir.join(sanitize_filename(baseline)).join(format!(
            "{}.{}.json",
            sanitize_filename(module),
            sanitize_filename(benchmark)
        ))
    }

    /// Write the percentiles of one benchmark into `baseline`
    pub fn save(
        &self,
        baseline: &str,
        module: &str,
        benchmark: &str,
        percentiles: &MetricPercentiles,
    ) -> Result<PathBuf, BaselineError> {
        validate_name(baseline)?;
        if percentiles.is_empty() {
            return Err(BaselineError::InvalidData(format!(
                "No results to store for {module}.{benchmark}"
            )));
        }

        let record = BaselineRecord {
            baseline: baseline.to_string(),
            module: module.to_string(),
            benchmark: benchmark.to_string(),
            created_at: chrono::Utc::now(),
            environment: EnvironmentInfo::capture(),
            percentiles: percentiles.clone(),
        };

        let path = self.record_path(baseline, module, benchmark);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BaselineError::Io(format!("Failed to create baseline directory: {}", e))
            })?;
        }
        let content = serde_json::to_string_pretty(&record).map_err(|e| {
            BaselineError::Serialization(format!("Failed to serialize baseline: {}", e))
        })?;
        fs::write(&path, content)
            .map_err(|e| BaselineError::Io(format!("Failed to write baseline file: {}", e)))?;

        debug!(path = %path.display(), "Saved baseline record");
        Ok(path)
    }

    /// Load one benchmark's record. `None` when the baseline has no record for it.
    pub fn load(
        &self,
        baseline: &str,
        module: &str,
        benchmark: &str,
    ) -> Result<Option<BaselineRecord>, BaselineError> {
        let path = self.record_path(baseline, module, benchmark);
        match fs::read_to_string(&path) {
            Ok(content) => parse_record(&content).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BaselineError::Io(format!(
                "Failed to read baseline file: {}",
                e
            ))),
        }
    }

    /// Names of all stored baselines, sorted
    pub fn list(&self) -> Result<Vec<String>, BaselineError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BaselineError::Io(format!(
                    "Failed to read baseline directory: {}",
                    e
                )));
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| BaselineError::Io(format!("Failed to read directory entry: {}", e)))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Every record of a baseline, sorted by module and benchmark
    pub fn records(&self, baseline: &str) -> Result<Vec<BaselineRecord>, BaselineError> {
        let dir = self.dir.join(sanitize_filename(baseline));
        let entries = fs::read_dir(&dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BaselineError::NotFound(baseline.to_string()),
            _ => BaselineError::Io(format!("Failed to read baseline directory: {}", e)),
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| BaselineError::Io(format!("Failed to read directory entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(|e| BaselineError::Io(format!("Failed to read baseline file: {}", e)))
                .and_then(|content| parse_record(&content));
            match loaded {
                Ok(record) => records.push(record),
                Err(e) => warn!("Failed to load baseline from {:?}: {}", path, e),
            }
        }
        records.sort_by(|a, b| (&a.module, &a.benchmark).cmp(&(&b.module, &b.benchmark)));
        Ok(records)
    }

    /// Delete a baseline and all of its records
    pub fn remove(&self, baseline: &str) -> Result<(), BaselineError> {
        validate_name(baseline)?;
        let dir = self.dir.join(sanitize_filename(baseline));
        fs::remove_dir_all(&dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BaselineError::NotFound(baseline.to_string()),
            _ => BaselineError::Io(format!("Failed to remove baseline: {}", e)),
        })?;
        info!(baseline = %baseline, "Removed baseline");
        Ok(())
    }
}

fn parse_record(content: &str) -> Result<BaselineRecord, BaselineError> {
    serde_json::from_str(content)
        .map_err(|e| BaselineError::Serialization(format!("Failed to parse baseline: {}", e)))
}

fn validate_name(baseline: &str) -> Result<(), BaselineError> {
    if baseline.trim().is_empty() || baseline == "." || baseline == ".." {
        return Err(BaselineError::InvalidData(format!(
            "Invalid baseline name '{baseline}'"
        )));
    }
    Ok(())
}

/// Sanitize filename for filesystem safety
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn get_hostname() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(name) = fs::read_to_string("/proc/sys/kernel/hostname") {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Get CPU information
fn get_cpu_info() -> String {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("model name"))
                    .and_then(|line| line.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }

    #[cfg(not(target_os = "linux"))]
    {
        "Unknown CPU".to_string()
    }
}

/// Get total system memory in MB
fn get_total_memory_mb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("MemTotal:"))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|kb| kb / 1024)
            })
            .unwrap_or(0)
    }

    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
