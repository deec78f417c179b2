//! Threshold comparison.
//!
//! For every metric that has both measured percentiles and a
//! [`ThresholdSpec`](crate::thresholds::ThresholdSpec), each percentile is
//! checked against its absolute bound first and against its relative bound
//! second. A percentile without a bound passes.

use crate::metric::MetricKind;
use crate::statistics::{Percentile, PercentileSet};
use crate::thresholds::Thresholds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Measured or stored percentiles per metric.
pub type MetricPercentiles = BTreeMap<MetricKind, PercentileSet>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Pass,
    FailAbsolute,
    FailRelative,
}

impl Outcome {
    pub fn is_pass(self) -> bool {
        self == Outcome::Pass
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Pass => "pass",
            Outcome::FailAbsolute => "absolute threshold exceeded",
            Outcome::FailRelative => "relative threshold exceeded",
        };
        f.write_str(label)
    }
}

/// The bound a failing percentile exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Bound {
    Absolute { max: u64 },
    Relative { max_percent: f64 },
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Absolute { max } => write!(f, "{}", max),
            Bound::Relative { max_percent } => write!(f, "{}%", max_percent),
        }
    }
}

/// Outcome for one metric and percentile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub metric: MetricKind,
    pub percentile: Percentile,
    pub outcome: Outcome,
    pub measured: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violated_bound: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<u64>,
    /// Deviation from the baseline in percent, positive means worse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_percent: Option<f64>,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: measured {}", self.metric.name(), self.percentile, self.measured)?;
        if let Some(baseline) = self.baseline {
            write!(f, ", baseline {}", baseline)?;
        }
        if let Some(deviation) = self.deviation_percent {
            write!(f, " ({:+.2}%)", deviation)?;
        }
        if let Some(bound) = self.violated_bound {
            write!(f, ", {} {}", self.outcome, bound)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }

    /// Fail if any verdict fails.
    pub fn combine(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        if verdicts.into_iter().all(Verdict::is_pass) {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// Every result of a comparison and the aggregated verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub results: Vec<ComparisonResult>,
    pub verdict: Verdict,
}

impl Comparison {
    pub fn failures(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.results.iter().filter(|r| !r.outcome.is_pass())
    }

    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Relative growth of `measured` over `baseline` in percent, rounded to six
/// decimals so a deviation sitting on a bound compares equal to it. A zero
/// baseline gives 0.
pub fn deviation_percent(measured: u64, baseline: u64) -> f64 {
    if baseline == 0 {
        return 0.0;
    }
    let deviation = 100.0 * measured as f64 / baseline as f64 - 100.0;
    (deviation * DEVIATION_SCALE).round() / DEVIATION_SCALE
}

const DEVIATION_SCALE: f64 = 1_000_000.0;

/// Compares measured percentiles against thresholds and an optional baseline.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdComparator<'a> {
    thresholds: &'a Thresholds,
    baseline: Option<&'a MetricPercentiles>,
}

impl<'a> ThresholdComparator<'a> {
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self {
            thresholds,
            baseline: None,
        }
    }

    pub fn with_baseline(mut self, baseline: &'a MetricPercentiles) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn compare(&self, measured: &MetricPercentiles) -> Comparison {
        let mut results = Vec::new();
        for (metric, percentiles) in measured {
            let Some(spec) = self.thresholds.get(metric) else {
                continue;
            };
            let baseline = self.baseline.and_then(|b| b.get(metric));

            for percentile in Percentile::ALL {
                let value = percentiles.get(percentile);
                let baseline_value = baseline.map(|b| b.get(percentile));
                let deviation = baseline_value.map(|b| deviation_percent(value, b));

                let mut outcome = Outcome::Pass;
                let mut violated_bound = None;
                if let Some(&max) = spec.absolute.get(&percentile) {
                    if value > max {
                        outcome = Outcome::FailAbsolute;
                        violated_bound = Some(Bound::Absolute { max });
                    }
                }
                if outcome.is_pass() {
                    if let (Some(&max_percent), Some(deviation)) =
                        (spec.relative.get(&percentile), deviation)
                    {
                        if deviation > max_percent {
                            outcome = Outcome::FailRelative;
                            violated_bound = Some(Bound::Relative { max_percent });
                        }
                    }
                }

                results.push(ComparisonResult {
                    metric: *metric,
                    percentile,
                    outcome,
                    measured: value,
                    violated_bound,
                    baseline: baseline_value,
                    deviation_percent: deviation,
                });
            }
        }

        let verdict = if results.iter().all(|r| r.outcome.is_pass()) {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Comparison { results, verdict }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdSpec;
    use rstest::rstest;

    fn single(metric: MetricKind, set: PercentileSet) -> MetricPercentiles {
        let mut map = BTreeMap::new();
        map.insert(metric, set);
        map
    }

    fn thresholds(metric: MetricKind, spec: ThresholdSpec) -> Thresholds {
        let mut map = Thresholds::new();
        map.insert(metric, spec);
        map
    }

    fn p90_result(comparison: &Comparison) -> &ComparisonResult {
        comparison
            .results
            .iter()
            .find(|r| r.percentile == Percentile::P90)
            .unwrap()
    }

    #[test]
    fn absolute_bound_wins_over_passing_relative_bound() {
        let measured = single(MetricKind::WallClock, PercentileSet::constant(1050));
        let baseline = single(MetricKind::WallClock, PercentileSet::constant(1040));
        let thresholds = thresholds(
            MetricKind::WallClock,
            ThresholdSpec::default()
                .with_absolute(Percentile::P90, 1000)
                .with_relative(Percentile::P90, 5.0),
        );

        let comparison = ThresholdComparator::new(&thresholds)
            .with_baseline(&baseline)
            .compare(&measured);

        let p90 = p90_result(&comparison);
        assert_eq!(p90.outcome, Outcome::FailAbsolute);
        assert_eq!(p90.violated_bound, Some(Bound::Absolute { max: 1000 }));
        assert_eq!(comparison.verdict, Verdict::Fail);
        assert_eq!(comparison.failures().count(), 1);
    }

    #[test]
    fn absolute_wins_when_both_bounds_fail() {
        let measured = single(MetricKind::MallocCountTotal, PercentileSet::constant(2000));
        let baseline = single(MetricKind::MallocCountTotal, PercentileSet::constant(1000));
        let thresholds = thresholds(
            MetricKind::MallocCountTotal,
            ThresholdSpec::default()
                .with_absolute(Percentile::P90, 1500)
                .with_relative(Percentile::P90, 10.0),
        );

        let comparison = ThresholdComparator::new(&thresholds)
            .with_baseline(&baseline)
            .compare(&measured);
        assert_eq!(p90_result(&comparison).outcome, Outcome::FailAbsolute);
    }

    #[rstest]
    #[case::within_bound(1040, 1000, 5.0, Outcome::Pass)]
    #[case::exactly_on_bound(1050, 1000, 5.0, Outcome::Pass)]
    #[case::on_bound_seven(1070, 1000, 7.0, Outcome::Pass)]
    #[case::on_fractional_bound(1007, 1000, 0.7, Outcome::Pass)]
    #[case::on_inexact_bound(1029, 1000, 2.9, Outcome::Pass)]
    #[case::just_over_fractional_bound(1008, 1000, 0.7, Outcome::FailRelative)]
    #[case::over_bound(1051, 1000, 5.0, Outcome::FailRelative)]
    #[case::improvement(800, 1000, 0.0, Outcome::Pass)]
    #[case::strict_unchanged(1000, 1000, 0.0, Outcome::Pass)]
    #[case::strict_regression(1001, 1000, 0.0, Outcome::FailRelative)]
    #[case::zero_baseline(5000, 0, 1.0, Outcome::Pass)]
    fn relative_bounds(
        #[case] measured: u64,
        #[case] baseline: u64,
        #[case] max_percent: f64,
        #[case] expected: Outcome,
    ) {
        let measured = single(MetricKind::WallClock, PercentileSet::constant(measured));
        let baseline = single(MetricKind::WallClock, PercentileSet::constant(baseline));
        let thresholds = thresholds(
            MetricKind::WallClock,
            ThresholdSpec::default().with_relative(Percentile::P90, max_percent),
        );

        let comparison = ThresholdComparator::new(&thresholds)
            .with_baseline(&baseline)
            .compare(&measured);
        assert_eq!(p90_result(&comparison).outcome, expected);
    }

    #[test]
    fn relative_bound_without_baseline_passes() {
        let measured = single(MetricKind::WallClock, PercentileSet::constant(9_999));
        let thresholds = thresholds(MetricKind::WallClock, ThresholdSpec::strict());

        let comparison = ThresholdComparator::new(&thresholds).compare(&measured);
        assert!(comparison.is_pass());
        assert!(comparison.results.iter().all(|r| r.deviation_percent.is_none()));
    }

    #[test]
    fn metrics_without_thresholds_are_not_compared() {
        let measured = single(MetricKind::RetainCount, PercentileSet::constant(3));
        let thresholds = thresholds(
            MetricKind::WallClock,
            ThresholdSpec::default().with_absolute(Percentile::P0, 0),
        );

        let comparison = ThresholdComparator::new(&thresholds).compare(&measured);
        assert!(comparison.results.is_empty());
        assert_eq!(comparison.verdict, Verdict::Pass);
    }

    #[test]
    fn result_reports_deviation_and_renders() {
        let measured = single(MetricKind::MallocCountTotal, PercentileSet::constant(1100));
        let baseline = single(MetricKind::MallocCountTotal, PercentileSet::constant(1000));
        let thresholds = thresholds(
            MetricKind::MallocCountTotal,
            ThresholdSpec::default().with_relative(Percentile::P90, 5.0),
        );

        let comparison = ThresholdComparator::new(&thresholds)
            .with_baseline(&baseline)
            .compare(&measured);
        let p90 = p90_result(&comparison);
        assert_eq!(p90.deviation_percent, Some(10.0));
        assert_eq!(
            p90.to_string(),
            "mallocCountTotal p90: measured 1100, baseline 1000 (+10.00%), relative threshold exceeded 5%"
        );
    }

    #[test]
    fn deviation_is_exact_on_decimal_bounds() {
        assert_eq!(deviation_percent(1070, 1000), 7.0);
        assert_eq!(deviation_percent(1007, 1000), 0.7);
        assert_eq!(deviation_percent(1029, 1000), 2.9);
        assert_eq!(deviation_percent(900, 1000), -10.0);
        assert_eq!(deviation_percent(42, 0), 0.0);
    }

    #[test]
    fn verdicts_combine() {
        assert_eq!(Verdict::combine([Verdict::Pass, Verdict::Pass]), Verdict::Pass);
        assert_eq!(Verdict::combine([Verdict::Pass, Verdict::Fail]), Verdict::Fail);
        assert_eq!(Verdict::combine([]), Verdict::Pass);
    }
}
