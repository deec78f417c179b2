//! Metric catalogue.
//!
//! Every measurable quantity is a [`MetricKind`]. A metric is backed either by
//! an interposition hook, by the operating system's process accounting, by the
//! clock, or is derived from several hook counters.

use crate::hooks::EventSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    /// Wall clock time of a batch, in nanoseconds
    WallClock,
    /// User space CPU time of a batch, in nanoseconds
    CpuUser,
    /// Kernel CPU time of a batch, in nanoseconds
    CpuSystem,
    /// User + kernel CPU time of a batch, in nanoseconds
    CpuTotal,
    /// Number of allocations
    MallocCountTotal,
    /// Number of bytes requested from the allocator
    AllocatedBytes,
    /// Number of deallocations
    FreeCountTotal,
    /// Allocations not matched by a deallocation within the batch
    MemoryLeaked,
    /// Number of tracked objects created
    ObjectAllocCount,
    /// Number of tracked handle clones
    RetainCount,
    /// Number of tracked handle drops
    ReleaseCount,
    /// `|objects + retains - releases|`, non-zero usually means a leak or cycle
    RetainReleaseDelta,
    /// I/O syscalls (read + write)
    Syscalls,
    /// Read-like syscalls
    ReadSyscalls,
    /// Write-like syscalls
    WriteSyscalls,
    /// Voluntary and involuntary context switches
    ContextSwitches,
    /// Resident set high-water mark at the end of the batch, in bytes
    PeakMemoryResident,
}

impl MetricKind {
    /// Every supported metric, in catalogue order.
    pub const ALL: &'static [MetricKind] = &[
        MetricKind::WallClock,
        MetricKind::CpuUser,
        MetricKind::CpuSystem,
        MetricKind::CpuTotal,
        MetricKind::MallocCountTotal,
        MetricKind::AllocatedBytes,
        MetricKind::FreeCountTotal,
        MetricKind::MemoryLeaked,
        MetricKind::ObjectAllocCount,
        MetricKind::RetainCount,
        MetricKind::ReleaseCount,
        MetricKind::RetainReleaseDelta,
        MetricKind::Syscalls,
        MetricKind::ReadSyscalls,
        MetricKind::WriteSyscalls,
        MetricKind::ContextSwitches,
        MetricKind::PeakMemoryResident,
    ];

    /// Metrics collected when a benchmark does not choose its own.
    pub const DEFAULT: &'static [MetricKind] = &[
        MetricKind::WallClock,
        MetricKind::CpuTotal,
        MetricKind::MallocCountTotal,
        MetricKind::PeakMemoryResident,
    ];

    /// Allocator related metrics.
    pub const MEMORY: &'static [MetricKind] = &[
        MetricKind::MallocCountTotal,
        MetricKind::AllocatedBytes,
        MetricKind::FreeCountTotal,
        MetricKind::MemoryLeaked,
        MetricKind::PeakMemoryResident,
    ];

    /// Object lifecycle metrics.
    pub const LIFECYCLE: &'static [MetricKind] = &[
        MetricKind::ObjectAllocCount,
        MetricKind::RetainCount,
        MetricKind::ReleaseCount,
        MetricKind::RetainReleaseDelta,
    ];

    /// Operating system accounting metrics.
    pub const SYSTEM: &'static [MetricKind] = &[
        MetricKind::CpuUser,
        MetricKind::CpuSystem,
        MetricKind::CpuTotal,
        MetricKind::Syscalls,
        MetricKind::ReadSyscalls,
        MetricKind::WriteSyscalls,
        MetricKind::ContextSwitches,
        MetricKind::PeakMemoryResident,
    ];

    /// Hook event sources this metric is computed from.
    pub fn event_sources(self) -> &'static [EventSource] {
        match self {
            MetricKind::MallocCountTotal | MetricKind::AllocatedBytes => &[EventSource::Allocation],
            MetricKind::FreeCountTotal => &[EventSource::Deallocation],
            MetricKind::MemoryLeaked => &[EventSource::Allocation, EventSource::Deallocation],
            MetricKind::ObjectAllocCount => &[EventSource::ObjectAlloc],
            MetricKind::RetainCount => &[EventSource::Retain],
            MetricKind::ReleaseCount => &[EventSource::Release],
            MetricKind::RetainReleaseDelta => &[
                EventSource::ObjectAlloc,
                EventSource::Retain,
                EventSource::Release,
            ],
            _ => &[],
        }
    }

    /// Whether the metric is read from operating system accounting.
    pub fn uses_os_stats(self) -> bool {
        matches!(
            self,
            MetricKind::CpuUser
                | MetricKind::CpuSystem
                | MetricKind::CpuTotal
                | MetricKind::Syscalls
                | MetricKind::ReadSyscalls
                | MetricKind::WriteSyscalls
                | MetricKind::ContextSwitches
                | MetricKind::PeakMemoryResident
        )
    }

    /// True for time based metrics (reported in nanoseconds).
    pub fn is_duration(self) -> bool {
        matches!(
            self,
            MetricKind::WallClock | MetricKind::CpuUser | MetricKind::CpuSystem | MetricKind::CpuTotal
        )
    }

    /// Stable machine name, as used in threshold and baseline files.
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::WallClock => "wallClock",
            MetricKind::CpuUser => "cpuUser",
            MetricKind::CpuSystem => "cpuSystem",
            MetricKind::CpuTotal => "cpuTotal",
            MetricKind::MallocCountTotal => "mallocCountTotal",
            MetricKind::AllocatedBytes => "allocatedBytes",
            MetricKind::FreeCountTotal => "freeCountTotal",
            MetricKind::MemoryLeaked => "memoryLeaked",
            MetricKind::ObjectAllocCount => "objectAllocCount",
            MetricKind::RetainCount => "retainCount",
            MetricKind::ReleaseCount => "releaseCount",
            MetricKind::RetainReleaseDelta => "retainReleaseDelta",
            MetricKind::Syscalls => "syscalls",
            MetricKind::ReadSyscalls => "readSyscalls",
            MetricKind::WriteSyscalls => "writeSyscalls",
            MetricKind::ContextSwitches => "contextSwitches",
            MetricKind::PeakMemoryResident => "peakMemoryResident",
        }
    }

    /// Unit suffix for display.
    pub fn unit(self) -> &'static str {
        match self {
            m if m.is_duration() => "ns",
            MetricKind::AllocatedBytes | MetricKind::PeakMemoryResident => "B",
            _ => "#",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetricKind::WallClock => "Time (wall clock)",
            MetricKind::CpuUser => "Time (user CPU)",
            MetricKind::CpuSystem => "Time (system CPU)",
            MetricKind::CpuTotal => "Time (total CPU)",
            MetricKind::MallocCountTotal => "Malloc (total)",
            MetricKind::AllocatedBytes => "Memory (allocated bytes)",
            MetricKind::FreeCountTotal => "Free (total)",
            MetricKind::MemoryLeaked => "Malloc / free Δ",
            MetricKind::ObjectAllocCount => "Object allocs",
            MetricKind::RetainCount => "Retains",
            MetricKind::ReleaseCount => "Releases",
            MetricKind::RetainReleaseDelta => "(Alloc + Retain) - Release Δ",
            MetricKind::Syscalls => "Syscalls (total)",
            MetricKind::ReadSyscalls => "Syscalls (read)",
            MetricKind::WriteSyscalls => "Syscalls (write)",
            MetricKind::ContextSwitches => "Context switches",
            MetricKind::PeakMemoryResident => "Memory (resident peak)",
        };
        f.write_str(label)
    }
}

/// Error returned when parsing an unknown metric name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for MetricKind {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .iter()
            .copied()
            .find(|metric| metric.name() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for metric in MetricKind::ALL {
            assert_eq!(metric.name().parse::<MetricKind>(), Ok(*metric));
        }
    }

    #[test]
    fn serde_name_matches_machine_name() {
        for metric in MetricKind::ALL {
            let json = serde_json::to_string(metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.name()));
        }
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let err = "mallocs".parse::<MetricKind>().unwrap_err();
        assert_eq!(err, UnknownMetric("mallocs".to_string()));
    }

    #[test]
    fn derived_metrics_depend_on_several_sources() {
        assert_eq!(MetricKind::RetainReleaseDelta.event_sources().len(), 3);
        assert_eq!(MetricKind::MemoryLeaked.event_sources().len(), 2);
        assert!(MetricKind::WallClock.event_sources().is_empty());
        assert!(!MetricKind::WallClock.uses_os_stats());
        assert!(MetricKind::Syscalls.uses_os_stats());
    }
}
