//! Built-in benchmark suites.

use benchmeter_core::{MetricKind, ThresholdSpec, Tracked};
use benchmeter_harness::{Benchmark, BenchmarkConfiguration, BenchmarkSuite};
use std::collections::HashMap;
use std::hint::black_box;

pub fn all() -> Vec<BenchmarkSuite> {
    vec![collections(), lifecycle(), io()]
}

fn collections() -> BenchmarkSuite {
    let config = BenchmarkConfiguration::default()
        .metrics(MetricKind::MEMORY)
        .scaling_factor(100)
        .threshold(MetricKind::MallocCountTotal, ThresholdSpec::standard());

    BenchmarkSuite::new("Collections")
        .with(Benchmark::new("vecPush", config.clone(), || {
            let mut values = Vec::new();
            for i in 0..64u64 {
                values.push(black_box(i));
            }
            black_box(values);
        }))
        .with(Benchmark::new("vecWithCapacity", config.clone(), || {
            let mut values = Vec::with_capacity(64);
            for i in 0..64u64 {
                values.push(black_box(i));
            }
            black_box(values);
        }))
        .with(Benchmark::new("hashMapInsert", config.clone(), || {
            let mut map = HashMap::new();
            for i in 0..32u32 {
                map.insert(black_box(i), i.to_string());
            }
            black_box(map);
        }))
        .with(Benchmark::new("stringFormat", config, || {
            black_box(format!("{}-{}", black_box(42), black_box("suffix")));
        }))
}

fn lifecycle() -> BenchmarkSuite {
    let config = BenchmarkConfiguration::default()
        .metrics(MetricKind::LIFECYCLE)
        .scaling_factor(1_000);

    BenchmarkSuite::new("Lifecycle")
        .with(Benchmark::new("cloneAndDrop", config.clone(), || {
            let handle = Tracked::new([0u8; 64]);
            let copy = handle.clone();
            black_box(copy.len());
        }))
        .with(Benchmark::new("sharedFanOut", config, || {
            let handle = Tracked::new(String::from("shared"));
            let copies: Vec<_> = (0..8).map(|_| handle.clone()).collect();
            black_box(copies.len());
        }))
}

fn io() -> BenchmarkSuite {
    let config = BenchmarkConfiguration::default()
        .metrics(&[
            MetricKind::Syscalls,
            MetricKind::WriteSyscalls,
            MetricKind::CpuTotal,
        ])
        .scaling_factor(10);

    BenchmarkSuite::new("Io").with(Benchmark::fallible("tempFileWrite", config, || {
        let path = std::env::temp_dir().join(format!("benchmeter-{}.tmp", std::process::id()));
        std::fs::write(&path, [0u8; 4096])?;
        std::fs::remove_file(&path)
    }))
}
