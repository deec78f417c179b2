//! Sample collection.
//!
//! The collector runs the workload in batches of `scaling_factor` logical
//! iterations. Warmup batches are executed but not measured; every measured
//! batch is wrapped in a [`MetricWindow`](crate::window::MetricWindow) and
//! yields exactly one [`Sample`] per metric. A batch that fails is discarded
//! as a whole and ends the run.

use crate::error::{BenchResult, BenchmarkError};
use crate::metric::MetricKind;
use crate::statistics::StatisticsSet;
use crate::window::SnapshotProducer;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::convert::Infallible;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::debug;

/// Serialize `Duration` as whole milliseconds.
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Iteration and duration limits of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Unmeasured batches run before measuring
    pub warmup_iterations: u64,
    /// Logical iterations per batch
    pub scaling_factor: u64,
    /// Measuring stops at the first batch boundary past this duration
    #[serde(with = "duration_serde")]
    pub max_duration: Duration,
    /// Upper bound on logical iterations, warmup included. Warmup batches
    /// always run in full and at least one measured batch follows, so a run
    /// can exceed this when warmup alone reaches it.
    pub max_iterations: u64,
    pub metrics: Vec<MetricKind>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 1,
            scaling_factor: 1,
            max_duration: Duration::from_secs(1),
            max_iterations: 10_000,
            metrics: MetricKind::DEFAULT.to_vec(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> BenchResult<()> {
        if self.scaling_factor == 0 {
            return Err(BenchmarkError::Configuration(
                "scaling_factor must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(BenchmarkError::Configuration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested metrics plus wall clock, sorted and deduplicated.
    pub fn effective_metrics(&self) -> Vec<MetricKind> {
        let mut metrics = self.metrics.clone();
        metrics.push(MetricKind::WallClock);
        metrics.sort_unstable();
        metrics.dedup();
        metrics
    }
}

/// One measurement of one metric for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: MetricKind,
    /// Sequence number of the batch, warmup batches included, starting at 1
    pub batch: u64,
    pub value: u64,
}

/// Consumer of samples.
pub trait SampleSink {
    fn accept(&mut self, sample: Sample) -> BenchResult<()>;
}

impl SampleSink for Vec<Sample> {
    fn accept(&mut self, sample: Sample) -> BenchResult<()> {
        self.push(sample);
        Ok(())
    }
}

impl SampleSink for StatisticsSet {
    fn accept(&mut self, sample: Sample) -> BenchResult<()> {
        self.record(sample.metric, sample.value)
    }
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn accept(&mut self, sample: Sample) -> BenchResult<()> {
        (**self).accept(sample)
    }
}

/// What a run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub warmup_batches: u64,
    pub measured_batches: u64,
    pub total_iterations: u64,
    /// Time spent in measured batches
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

/// Drives a workload and feeds samples to a sink.
#[derive(Debug, Clone)]
pub struct SampleCollector<'r> {
    producer: SnapshotProducer<'r>,
    config: CollectorConfig,
    metrics: Vec<MetricKind>,
}

impl<'r> SampleCollector<'r> {
    pub fn new(producer: SnapshotProducer<'r>, config: CollectorConfig) -> BenchResult<Self> {
        config.validate()?;
        let metrics = config.effective_metrics();
        Ok(Self {
            producer,
            config,
            metrics,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Metrics every measured batch reports.
    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    /// Run a workload that never fails.
    pub fn run_infallible<F, S>(&self, mut workload: F, sink: &mut S) -> BenchResult<RunSummary>
    where
        F: FnMut(),
        S: SampleSink + ?Sized,
    {
        self.run(
            || {
                workload();
                Ok::<(), Infallible>(())
            },
            sink,
        )
    }

    /// Run `workload` until the iteration or duration limit is reached.
    ///
    /// At least one batch is always measured. An error or panic in the
    /// workload discards the current batch and is returned as
    /// [`BenchmarkError::WorkloadExecution`].
    pub fn run<F, E, S>(&self, mut workload: F, sink: &mut S) -> BenchResult<RunSummary>
    where
        F: FnMut() -> Result<(), E>,
        E: Display,
        S: SampleSink + ?Sized,
    {
        let batch_size = self.config.scaling_factor;
        let mut batch = 0u64;
        let mut total_iterations = 0u64;

        for _ in 0..self.config.warmup_iterations {
            batch += 1;
            execute_batch(&mut workload, batch_size, batch)?;
            total_iterations += batch_size;
        }

        let measuring = Instant::now();
        let mut measured_batches = 0u64;
        loop {
            batch += 1;
            let snapshot = {
                let mut window = self.producer.begin_window(&self.metrics)?;
                execute_batch(&mut workload, batch_size, batch)?;
                window.end()?
            };
            total_iterations += batch_size;
            measured_batches += 1;

            for (metric, value) in snapshot.iter() {
                sink.accept(Sample {
                    metric,
                    batch,
                    value,
                })?;
            }

            if total_iterations.saturating_add(batch_size) > self.config.max_iterations {
                break;
            }
            if measuring.elapsed() >= self.config.max_duration {
                debug!(
                    measured_batches,
                    max_duration = ?self.config.max_duration,
                    "Max duration reached"
                );
                break;
            }
        }

        Ok(RunSummary {
            warmup_batches: self.config.warmup_iterations,
            measured_batches,
            total_iterations,
            elapsed: measuring.elapsed(),
        })
    }
}

fn execute_batch<F, E>(workload: &mut F, iterations: u64, batch: u64) -> BenchResult<()>
where
    F: FnMut() -> Result<(), E>,
    E: Display,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        for _ in 0..iterations {
            workload()?;
        }
        Ok::<(), E>(())
    }));

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(BenchmarkError::WorkloadExecution {
            batch,
            reason: err.to_string(),
        }),
        Err(payload) => Err(BenchmarkError::WorkloadExecution {
            batch,
            reason: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
