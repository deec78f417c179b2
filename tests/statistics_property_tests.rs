//! Property-Based Tests for Percentile Reduction and Comparison
//!
//! Invariants that must hold for any sample stream: percentiles are ordered,
//! bounded by the exact extremes, and independent of arrival order.

use benchmeter::{
    MetricKind, Percentile, PercentileSet, StatisticsSet, ThresholdComparator, ThresholdSpec,
    Thresholds, Verdict,
};
use benchmeter_core::comparison::deviation_percent;
use benchmeter_core::{MetricPercentiles, PercentileRecorder};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

// Values up to a few hours in nanoseconds
fn samples_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..10_000_000_000_000, 1..500)
}

fn reduce(values: &[u64]) -> PercentileSet {
    let mut recorder = PercentileRecorder::new().unwrap();
    for value in values {
        recorder.record(*value).unwrap();
    }
    recorder.percentiles().unwrap()
}

proptest! {
    /// Property: percentiles never decrease with the percentile rank
    #[test]
    fn prop_percentiles_are_monotone(values in samples_strategy()) {
        let set = reduce(&values);
        let ordered: Vec<u64> = set.iter().map(|(_, value)| value).collect();
        prop_assert!(ordered.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", ordered);
    }

    /// Property: p0 and p100 are the exact extremes
    #[test]
    fn prop_extremes_are_exact(values in samples_strategy()) {
        let set = reduce(&values);
        prop_assert_eq!(set.get(Percentile::P0), *values.iter().min().unwrap());
        prop_assert_eq!(set.get(Percentile::P100), *values.iter().max().unwrap());
    }

    /// Property: arrival order does not change the result
    #[test]
    fn prop_order_independent(values in samples_strategy(), seed in any::<u64>()) {
        let mut shuffled = values.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(reduce(&values), reduce(&shuffled));
    }

    /// Property: a constant stream reduces to a constant set
    #[test]
    fn prop_constant_stream(value in 0u64..1_000_000_000, count in 1usize..200) {
        let values = vec![value; count];
        prop_assert_eq!(reduce(&values), PercentileSet::constant(value));
    }

    /// Property: the mean lies between the extremes
    #[test]
    fn prop_mean_is_bounded(values in samples_strategy()) {
        let mut statistics = StatisticsSet::new();
        for value in &values {
            statistics.record(MetricKind::WallClock, *value).unwrap();
        }
        let mean = statistics.mean(MetricKind::WallClock).unwrap();
        let min = *values.iter().min().unwrap() as f64;
        let max = *values.iter().max().unwrap() as f64;
        prop_assert!(mean >= min && mean <= max, "mean {} outside [{}, {}]", mean, min, max);
        prop_assert_eq!(statistics.count(MetricKind::WallClock), values.len() as u64);
    }

    /// Property: measuring exactly the absolute bound passes
    #[test]
    fn prop_bound_is_inclusive(value in 0u64..1_000_000) {
        let mut thresholds = Thresholds::new();
        thresholds.insert(
            MetricKind::MallocCountTotal,
            ThresholdSpec::default().with_absolute(Percentile::P90, value),
        );
        let mut measured = MetricPercentiles::new();
        measured.insert(MetricKind::MallocCountTotal, PercentileSet::constant(value));

        let comparison = ThresholdComparator::new(&thresholds).compare(&measured);
        prop_assert_eq!(comparison.verdict, Verdict::Pass);

        measured.insert(MetricKind::MallocCountTotal, PercentileSet::constant(value + 1));
        let comparison = ThresholdComparator::new(&thresholds).compare(&measured);
        prop_assert_eq!(comparison.verdict, Verdict::Fail);
    }

    /// Property: a zero baseline never produces a relative failure
    #[test]
    fn prop_zero_baseline_has_no_deviation(measured in any::<u64>()) {
        prop_assert_eq!(deviation_percent(measured, 0), 0.0);
    }
}
