//! Measurement windows over the hook registry.
//!
//! A [`MetricWindow`] installs the hooks its metrics need, remembers where
//! every counter started, and on [`MetricWindow::end`] turns the counter growth
//! into a [`MetricSnapshot`]. Hooks that were already active when the window
//! opened belong to an enclosing window: they are read, never reset or
//! uninstalled, so the outer totals stay intact.
//!
//! Everything that allocates (building the metric list, reading
//! `/proc/self/io`, assembling the snapshot map) happens either before hooks
//! are installed or after they are removed.

use crate::error::{BenchResult, BenchmarkError};
use crate::hooks::{EventSource, HookReadings, HookRegistry};
use crate::metric::MetricKind;
use crate::os_stats::OsStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Syscalls spent by the sampler itself, subtracted from every window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyscallOverhead {
    pub read: u64,
    pub write: u64,
}

/// Opens measurement windows against one registry.
#[derive(Debug, Clone)]
pub struct SnapshotProducer<'r> {
    registry: &'r HookRegistry,
    overhead: SyscallOverhead,
}

impl SnapshotProducer<'static> {
    /// Producer over [`HookRegistry::global`].
    pub fn global() -> BenchResult<Self> {
        Self::new(HookRegistry::global())
    }
}

impl<'r> SnapshotProducer<'r> {
    /// Bind `registry` and calibrate the sampler's own syscall cost.
    pub fn new(registry: &'r HookRegistry) -> BenchResult<Self> {
        let first = OsStats::sample()?;
        let second = OsStats::sample()?;
        let delta = second.since(&first);
        let overhead = SyscallOverhead {
            read: delta.read_syscalls,
            write: delta.write_syscalls,
        };
        debug!(read = overhead.read, write = overhead.write, "Calibrated syscall overhead");
        Ok(Self { registry, overhead })
    }

    /// Producer with a known overhead, skipping calibration.
    pub fn with_overhead(registry: &'r HookRegistry, overhead: SyscallOverhead) -> Self {
        Self { registry, overhead }
    }

    pub fn registry(&self) -> &'r HookRegistry {
        self.registry
    }

    pub fn overhead(&self) -> SyscallOverhead {
        self.overhead
    }

    /// Open a window measuring `metrics`.
    pub fn begin_window(&self, metrics: &[MetricKind]) -> BenchResult<MetricWindow<'r>> {
        MetricWindow::open(self.registry, self.overhead, metrics)
    }
}

/// An open measurement window. Uninstalls the hooks it installed when ended
/// or dropped.
#[derive(Debug)]
pub struct MetricWindow<'r> {
    registry: &'r HookRegistry,
    overhead: SyscallOverhead,
    metrics: Vec<MetricKind>,
    owned: [bool; EventSource::COUNT],
    hooks_start: HookReadings,
    os_start: Option<OsStats>,
    started: Instant,
    ended: bool,
}

impl<'r> MetricWindow<'r> {
    fn open(
        registry: &'r HookRegistry,
        overhead: SyscallOverhead,
        metrics: &[MetricKind],
    ) -> BenchResult<Self> {
        let mut metrics = metrics.to_vec();
        metrics.sort_unstable();
        metrics.dedup();

        let mut needed = [false; EventSource::COUNT];
        for metric in &metrics {
            for source in metric.event_sources() {
                needed[*source as usize] = true;
            }
        }

        let os_start = if metrics.iter().any(|m| m.uses_os_stats()) {
            Some(OsStats::sample()?)
        } else {
            None
        };

        let mut owned = [false; EventSource::COUNT];
        for source in EventSource::ALL {
            if needed[source as usize] {
                // An active hook belongs to an enclosing window
                owned[source as usize] = registry.state(source).install();
            }
        }

        let hooks_start = HookReadings::capture(registry);
        let started = Instant::now();

        Ok(Self {
            registry,
            overhead,
            metrics,
            owned,
            hooks_start,
            os_start,
            started,
            ended: false,
        })
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    /// Whether this window installed (rather than reused) the hook.
    pub fn owns(&self, source: EventSource) -> bool {
        self.owned[source as usize]
    }

    /// Close the window and report the growth of every requested metric.
    ///
    /// A second call fails with [`BenchmarkError::InvalidWindowState`].
    pub fn end(&mut self) -> BenchResult<MetricSnapshot> {
        if self.ended {
            return Err(BenchmarkError::InvalidWindowState("window already ended"));
        }
        let elapsed = self.started.elapsed();
        self.release_hooks();
        let hooks = HookReadings::capture(self.registry).since(&self.hooks_start);

        let os = match &self.os_start {
            Some(start) => {
                let delta = OsStats::sample()?.since(start);
                Some(OsStats {
                    read_syscalls: delta.read_syscalls.saturating_sub(self.overhead.read),
                    write_syscalls: delta.write_syscalls.saturating_sub(self.overhead.write),
                    ..delta
                })
            }
            None => None,
        };

        let values = self
            .metrics
            .iter()
            .map(|metric| (*metric, metric_value(*metric, &hooks, os.as_ref(), elapsed)))
            .collect();

        Ok(MetricSnapshot { values, elapsed })
    }

    fn release_hooks(&mut self) {
        self.ended = true;
        for source in EventSource::ALL {
            if self.owned[source as usize] {
                self.registry.uninstall(source);
            }
        }
    }
}

impl Drop for MetricWindow<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.release_hooks();
        }
    }
}

fn metric_value(
    metric: MetricKind,
    hooks: &HookReadings,
    os: Option<&OsStats>,
    elapsed: Duration,
) -> u64 {
    if metric == MetricKind::WallClock {
        return duration_ns(elapsed);
    }
    if let Some(value) = hooks.value(metric) {
        return value;
    }
    let Some(os) = os else {
        return 0;
    };
    match metric {
        MetricKind::CpuUser => os.cpu_user_ns,
        MetricKind::CpuSystem => os.cpu_system_ns,
        MetricKind::CpuTotal => os.cpu_total_ns(),
        MetricKind::Syscalls => os.syscalls(),
        MetricKind::ReadSyscalls => os.read_syscalls,
        MetricKind::WriteSyscalls => os.write_syscalls,
        MetricKind::ContextSwitches => os.context_switches,
        MetricKind::PeakMemoryResident => os.peak_resident_bytes,
        _ => 0,
    }
}

pub(crate) fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Values measured by one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    values: BTreeMap<MetricKind, u64>,
    #[serde(with = "crate::collector::duration_serde")]
    elapsed: Duration,
}

impl MetricSnapshot {
    pub fn get(&self, metric: MetricKind) -> Option<u64> {
        self.values.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, u64)> + '_ {
        self.values.iter().map(|(metric, value)| (*metric, *value))
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<MetricKind, u64> {
        self.values
    }
}
