// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmark for durations file formatting and summary statistics.

use criterion::{criterion_group, criterion_main, Criterion};
use inferbenchlib::bench::LatencySample;
use inferbenchlib::report;
use std::time::Duration;

fn samples() -> Vec<LatencySample> {
    (0..400u64)
        .map(|i| LatencySample {
            delay: Duration::from_millis((i / 100) * 50),
            duration: Duration::from_micros(8_000 + (i * 37) % 5_000),
        })
        .collect()
}

fn bench_write_durations(c: &mut Criterion) {
    let samples = samples();
    c.bench_function("write_durations_to", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(4096);
            report::write_durations_to(&mut out, &samples).unwrap();
            out
        });
    });
}

fn bench_summarize(c: &mut Criterion) {
    let samples = samples();
    c.bench_function("summarize", |b| {
        b.iter(|| report::summarize(&samples));
    });
}

criterion_group!(benches, bench_write_durations, bench_summarize);
criterion_main!(benches);
