//! Threshold specifications and threshold files.
//!
//! A threshold file lives at `<root>/Thresholds/<Module>.<Benchmark>.p90.json`
//! and maps metric names to either a full [`ThresholdSpec`] or a bare integer,
//! the latter being an absolute bound on `p90`:
//!
//! ```json
//! {
//!   "mallocCountTotal": 1000,
//!   "wallClock": { "relative": { "p50": 5.0 }, "absolute": { "p99": 2000000 } }
//! }
//! ```

use crate::error::{BenchResult, BenchmarkError};
use crate::metric::MetricKind;
use crate::statistics::{Percentile, PercentileSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the threshold root holding threshold files.
pub const THRESHOLDS_DIR: &str = "Thresholds";

/// Per-metric thresholds.
pub type Thresholds = BTreeMap<MetricKind, ThresholdSpec>;

/// Bounds for one metric.
///
/// `relative` holds the maximum allowed regression against the baseline in
/// percent, `absolute` the maximum allowed measured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relative: BTreeMap<Percentile, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub absolute: BTreeMap<Percentile, u64>,
}

impl ThresholdSpec {
    /// No regression tolerated from `p25` to `p99`.
    pub fn strict() -> Self {
        Self::relative_only(&[
            (Percentile::P25, 0.0),
            (Percentile::P50, 0.0),
            (Percentile::P75, 0.0),
            (Percentile::P90, 0.0),
            (Percentile::P99, 0.0),
        ])
    }

    /// 5% on the interquartile percentiles.
    pub fn standard() -> Self {
        Self::relative_only(&[
            (Percentile::P25, 5.0),
            (Percentile::P50, 5.0),
            (Percentile::P75, 5.0),
        ])
    }

    /// 25% on the median.
    pub fn relaxed() -> Self {
        Self::relative_only(&[(Percentile::P50, 25.0)])
    }

    pub fn none() -> Self {
        Self::default()
    }

    fn relative_only(bounds: &[(Percentile, f64)]) -> Self {
        Self {
            relative: bounds.iter().copied().collect(),
            absolute: BTreeMap::new(),
        }
    }

    pub fn with_relative(mut self, percentile: Percentile, percent: f64) -> Self {
        self.relative.insert(percentile, percent);
        self
    }

    pub fn with_absolute(mut self, percentile: Percentile, max: u64) -> Self {
        self.absolute.insert(percentile, max);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.relative.is_empty() && self.absolute.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ThresholdEntry {
    P90(u64),
    Spec(ThresholdSpec),
}

impl From<ThresholdEntry> for ThresholdSpec {
    fn from(entry: ThresholdEntry) -> Self {
        match entry {
            ThresholdEntry::P90(max) => ThresholdSpec::default().with_absolute(Percentile::P90, max),
            ThresholdEntry::Spec(spec) => spec,
        }
    }
}

/// Decode the content of a threshold file.
pub fn decode_thresholds(content: &str) -> Result<Thresholds, serde_json::Error> {
    let entries: BTreeMap<MetricKind, ThresholdEntry> = serde_json::from_str(content)?;
    Ok(entries
        .into_iter()
        .map(|(metric, entry)| (metric, entry.into()))
        .collect())
}

/// `<root>/Thresholds/<module>.<benchmark>.p90.json`
pub fn threshold_file_path(root: &Path, module: &str, benchmark: &str) -> PathBuf {
    root.join(THRESHOLDS_DIR).join(format!(
        "{}.{}.p90.json",
        path_safe(module),
        path_safe(benchmark)
    ))
}

fn path_safe(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

/// Load the thresholds of one benchmark. A missing file means no thresholds.
pub fn load_thresholds(root: &Path, module: &str, benchmark: &str) -> BenchResult<Thresholds> {
    load_thresholds_from(&threshold_file_path(root, module, benchmark))
}

pub fn load_thresholds_from(path: &Path) -> BenchResult<Thresholds> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No threshold file");
            return Ok(Thresholds::new());
        }
        Err(source) => {
            return Err(BenchmarkError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    decode_thresholds(&content).map_err(|source| BenchmarkError::ThresholdDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the measured `p90` of every metric as its absolute bound.
pub fn write_p90_thresholds(
    root: &Path,
    module: &str,
    benchmark: &str,
    percentiles: &BTreeMap<MetricKind, PercentileSet>,
) -> BenchResult<PathBuf> {
    let path = threshold_file_path(root, module, benchmark);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| BenchmarkError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let p90: BTreeMap<MetricKind, u64> = percentiles
        .iter()
        .map(|(metric, set)| (*metric, set.get(Percentile::P90)))
        .collect();
    let content = serde_json::to_string_pretty(&p90)
        .map_err(|e| BenchmarkError::Configuration(format!("Failed to encode thresholds: {}", e)))?;
    fs::write(&path, content).map_err(|source| BenchmarkError::Io {
        path: path.clone(),
        source,
    })?;

    debug!(path = %path.display(), metrics = p90.len(), "Wrote p90 thresholds");
    Ok(path)
}
