//! Process accounting from the operating system.

use crate::error::{BenchResult, BenchmarkError};
use serde::{Deserialize, Serialize};

/// Snapshot of the process' resource usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsStats {
    pub cpu_user_ns: u64,
    pub cpu_system_ns: u64,
    pub context_switches: u64,
    /// High-water mark of the resident set, in bytes
    pub peak_resident_bytes: u64,
    pub read_syscalls: u64,
    pub write_syscalls: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl OsStats {
    /// Sample the current process.
    pub fn sample() -> BenchResult<Self> {
        let mut stats = rusage_stats()?;
        let io = proc_io()?;
        stats.read_syscalls = io.read_syscalls;
        stats.write_syscalls = io.write_syscalls;
        stats.read_bytes = io.read_bytes;
        stats.write_bytes = io.write_bytes;
        Ok(stats)
    }

    /// Growth since `start`. The resident peak is a gauge and keeps its
    /// current value.
    pub fn since(&self, start: &OsStats) -> OsStats {
        OsStats {
            cpu_user_ns: self.cpu_user_ns.saturating_sub(start.cpu_user_ns),
            cpu_system_ns: self.cpu_system_ns.saturating_sub(start.cpu_system_ns),
            context_switches: self.context_switches.saturating_sub(start.context_switches),
            peak_resident_bytes: self.peak_resident_bytes,
            read_syscalls: self.read_syscalls.saturating_sub(start.read_syscalls),
            write_syscalls: self.write_syscalls.saturating_sub(start.write_syscalls),
            read_bytes: self.read_bytes.saturating_sub(start.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(start.write_bytes),
        }
    }

    pub fn syscalls(&self) -> u64 {
        self.read_syscalls + self.write_syscalls
    }

    pub fn cpu_total_ns(&self) -> u64 {
        self.cpu_user_ns + self.cpu_system_ns
    }
}

#[cfg(unix)]
fn rusage_stats() -> BenchResult<OsStats> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if result != 0 {
        return Err(BenchmarkError::SystemCall(format!(
            "getrusage failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let timeval_ns = |tv: libc::timeval| tv.tv_sec as u64 * 1_000_000_000 + tv.tv_usec as u64 * 1_000;

    // ru_maxrss is kilobytes on Linux and bytes on macOS
    #[cfg(target_os = "macos")]
    let peak_resident_bytes = usage.ru_maxrss as u64;
    #[cfg(not(target_os = "macos"))]
    let peak_resident_bytes = usage.ru_maxrss as u64 * 1024;

    Ok(OsStats {
        cpu_user_ns: timeval_ns(usage.ru_utime),
        cpu_system_ns: timeval_ns(usage.ru_stime),
        context_switches: (usage.ru_nvcsw + usage.ru_nivcsw) as u64,
        peak_resident_bytes,
        ..OsStats::default()
    })
}

#[cfg(not(unix))]
fn rusage_stats() -> BenchResult<OsStats> {
    Ok(OsStats::default())
}

/// I/O counters from `/proc/self/io`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub read_syscalls: u64,
    pub write_syscalls: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[cfg(target_os = "linux")]
fn proc_io() -> BenchResult<IoCounters> {
    match std::fs::read_to_string("/proc/self/io") {
        Ok(content) => parse_proc_io(&content),
        // Restricted containers hide the file; treat as no I/O accounting
        Err(e) if matches!(
            e.kind(),
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
        ) =>
        {
            Ok(IoCounters::default())
        }
        Err(e) => Err(BenchmarkError::SystemCall(format!(
            "Failed to read /proc/self/io: {}",
            e
        ))),
    }
}

#[cfg(not(target_os = "linux"))]
fn proc_io() -> BenchResult<IoCounters> {
    Ok(IoCounters::default())
}

/// Parse the `key: value` lines of `/proc/<pid>/io`. Unknown keys are
/// skipped, a known key with a non-numeric value is an error.
pub fn parse_proc_io(content: &str) -> BenchResult<IoCounters> {
    let mut counters = IoCounters::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "syscr" => &mut counters.read_syscalls,
            "syscw" => &mut counters.write_syscalls,
            "rchar" => &mut counters.read_bytes,
            "wchar" => &mut counters.write_bytes,
            _ => continue,
        };
        *slot = value.trim().parse().map_err(|_| {
            BenchmarkError::SystemCall(format!("Invalid /proc/self/io line: {}", line))
        })?;
    }
    Ok(counters)
}
