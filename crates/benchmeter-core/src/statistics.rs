//! Percentile statistics.
//!
//! Samples are folded into an HDR histogram with three significant digits:
//! values below 2048 are exact and every other value is reported within 0.1%
//! of what was recorded. Memory grows with the logarithm of the value range,
//! never with the number of samples. Exact minimum and maximum are tracked
//! beside the histogram, so `p0` and `p100` are always exact and every other
//! percentile is clamped between them.

use crate::error::{BenchResult, BenchmarkError};
use crate::metric::MetricKind;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::str::FromStr;

const SIGNIFICANT_DIGITS: u8 = 3;

/// The reported percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Percentile {
    #[serde(rename = "p0")]
    P0,
    #[serde(rename = "p25")]
    P25,
    #[serde(rename = "p50")]
    P50,
    #[serde(rename = "p75")]
    P75,
    #[serde(rename = "p90")]
    P90,
    #[serde(rename = "p99")]
    P99,
    #[serde(rename = "p100")]
    P100,
}

impl Percentile {
    pub const ALL: [Percentile; 7] = [
        Percentile::P0,
        Percentile::P25,
        Percentile::P50,
        Percentile::P75,
        Percentile::P90,
        Percentile::P99,
        Percentile::P100,
    ];

    pub fn quantile(self) -> f64 {
        match self {
            Percentile::P0 => 0.0,
            Percentile::P25 => 0.25,
            Percentile::P50 => 0.50,
            Percentile::P75 => 0.75,
            Percentile::P90 => 0.90,
            Percentile::P99 => 0.99,
            Percentile::P100 => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Percentile::P0 => "p0",
            Percentile::P25 => "p25",
            Percentile::P50 => "p50",
            Percentile::P75 => "p75",
            Percentile::P90 => "p90",
            Percentile::P99 => "p99",
            Percentile::P100 => "p100",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Percentile {
    type Err = PercentileSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Percentile::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| PercentileSetError::UnknownPercentile(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PercentileSetError {
    #[error("Unknown percentile: {0}")]
    UnknownPercentile(String),
    #[error("Missing percentile {0}")]
    Missing(Percentile),
    #[error("Percentiles must be non-decreasing, {lower} > {higher}")]
    NotMonotone { lower: Percentile, higher: Percentile },
}

/// Values for every [`Percentile`], non-decreasing from `p0` to `p100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Percentile, u64>",
    into = "BTreeMap<Percentile, u64>"
)]
pub struct PercentileSet {
    values: [u64; 7],
}

impl PercentileSet {
    /// Build from values ordered like [`Percentile::ALL`].
    pub fn from_values(values: [u64; 7]) -> Result<Self, PercentileSetError> {
        for i in 1..values.len() {
            if values[i - 1] > values[i] {
                return Err(PercentileSetError::NotMonotone {
                    lower: Percentile::ALL[i - 1],
                    higher: Percentile::ALL[i],
                });
            }
        }
        Ok(Self { values })
    }

    /// A set where every percentile has the same value.
    pub fn constant(value: u64) -> Self {
        Self { values: [value; 7] }
    }

    pub fn get(&self, percentile: Percentile) -> u64 {
        self.values[percentile.index()]
    }

    pub fn min(&self) -> u64 {
        self.get(Percentile::P0)
    }

    pub fn max(&self) -> u64 {
        self.get(Percentile::P100)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Percentile, u64)> + '_ {
        Percentile::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

impl TryFrom<BTreeMap<Percentile, u64>> for PercentileSet {
    type Error = PercentileSetError;

    fn try_from(map: BTreeMap<Percentile, u64>) -> Result<Self, Self::Error> {
        let mut values = [0u64; 7];
        for percentile in Percentile::ALL {
            values[percentile.index()] = *map
                .get(&percentile)
                .ok_or(PercentileSetError::Missing(percentile))?;
        }
        Self::from_values(values)
    }
}

impl From<PercentileSet> for BTreeMap<Percentile, u64> {
    fn from(set: PercentileSet) -> Self {
        set.iter().collect()
    }
}

/// Bounded-memory percentile estimator for one metric.
#[derive(Debug, Clone)]
pub struct PercentileRecorder {
    histogram: Histogram<u64>,
    min: u64,
    max: u64,
    sum: u128,
}

impl PercentileRecorder {
    pub fn new() -> BenchResult<Self> {
        let mut histogram = Histogram::<u64>::new(SIGNIFICANT_DIGITS)
            .map_err(|e| BenchmarkError::Histogram(format!("{:?}", e)))?;
        histogram.auto(true);
        Ok(Self {
            histogram,
            min: u64::MAX,
            max: 0,
            sum: 0,
        })
    }

    pub fn record(&mut self, value: u64) -> BenchResult<()> {
        self.histogram
            .record(value)
            .map_err(|e| BenchmarkError::Histogram(format!("{:?}", e)))?;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += u128::from(value);
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Exact arithmetic mean of the recorded values.
    pub fn mean(&self) -> Option<f64> {
        match self.count() {
            0 => None,
            n => Some(self.sum as f64 / n as f64),
        }
    }

    pub fn percentile(&self, percentile: Percentile) -> BenchResult<u64> {
        if self.is_empty() {
            return Err(BenchmarkError::NoSamples);
        }
        let value = match percentile {
            Percentile::P0 => self.min,
            Percentile::P100 => self.max,
            p => self
                .histogram
                .value_at_quantile(p.quantile())
                .clamp(self.min, self.max),
        };
        Ok(value)
    }

    pub fn percentiles(&self) -> BenchResult<PercentileSet> {
        if self.is_empty() {
            return Err(BenchmarkError::NoSamples);
        }
        let mut values = [0u64; 7];
        for percentile in Percentile::ALL {
            values[percentile.index()] = self.percentile(percentile)?;
        }
        PercentileSet::from_values(values).map_err(|e| BenchmarkError::Histogram(e.to_string()))
    }
}

/// One recorder per metric.
#[derive(Debug, Clone, Default)]
pub struct StatisticsSet {
    recorders: BTreeMap<MetricKind, PercentileRecorder>,
}

impl StatisticsSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register `metrics`, so that a metric without samples is reported as
    /// [`BenchmarkError::NoSamples`] instead of silently missing.
    pub fn with_metrics(metrics: &[MetricKind]) -> BenchResult<Self> {
        let mut set = Self::new();
        for metric in metrics {
            if !set.recorders.contains_key(metric) {
                set.recorders.insert(*metric, PercentileRecorder::new()?);
            }
        }
        Ok(set)
    }

    pub fn record(&mut self, metric: MetricKind, value: u64) -> BenchResult<()> {
        let recorder = match self.recorders.entry(metric) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(PercentileRecorder::new()?),
        };
        recorder.record(value)
    }

    pub fn recorder(&self, metric: MetricKind) -> Option<&PercentileRecorder> {
        self.recorders.get(&metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.recorders.keys().copied()
    }

    pub fn count(&self, metric: MetricKind) -> u64 {
        self.recorders.get(&metric).map_or(0, PercentileRecorder::count)
    }

    pub fn mean(&self, metric: MetricKind) -> Option<f64> {
        self.recorders.get(&metric).and_then(PercentileRecorder::mean)
    }

    /// Reduce every metric to its percentile set.
    pub fn percentiles(&self) -> BenchResult<BTreeMap<MetricKind, PercentileSet>> {
        if self.recorders.is_empty() {
            return Err(BenchmarkError::NoSamples);
        }
        self.recorders
            .iter()
            .map(|(metric, recorder)| Ok((*metric, recorder.percentiles()?)))
            .collect()
    }
}
