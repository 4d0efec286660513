// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmark for random input generation and sweep overhead.
//!
//! Input generation runs inside the timed loop's setup on every iteration,
//! so it should stay small next to the inference call it feeds.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use inferbenchlib::bench::{generate_random_input, Sweep};
use inferbenchlib::inference::{FloatResultView, FloatSlice, Runner};
use std::time::Duration;

/// Runner that echoes a constant output without an engine
struct NullRunner {
    input: Vec<usize>,
    output: Vec<usize>,
    data: Vec<f32>,
}

impl Runner for NullRunner {
    fn input_shape(&self) -> &[usize] {
        &self.input
    }

    fn output_shape(&self) -> &[usize] {
        &self.output
    }

    fn run_with(
        &mut self,
        _input: &[f32],
        on_result: &mut dyn FnMut(&dyn FloatResultView) -> inferbenchlib::Result<()>,
    ) -> inferbenchlib::Result<()> {
        on_result(&FloatSlice(&self.data))
    }
}

fn bench_generate_random_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_random_input");
    for shape in [vec![1, 3, 32, 32], vec![1, 3, 224, 224]] {
        let id = format!("{:?}", shape);
        group.bench_with_input(BenchmarkId::from_parameter(id), &shape, |b, shape| {
            b.iter(|| generate_random_input(shape));
        });
    }
    group.finish();
}

fn bench_sweep_overhead(c: &mut Criterion) {
    let mut runner = NullRunner {
        input: vec![1, 3, 32, 32],
        output: vec![1, 1000],
        data: vec![0.0; 1000],
    };
    let sweep = Sweep::new(10, vec![Duration::ZERO]);
    c.bench_function("sweep_overhead", |b| {
        b.iter(|| sweep.run(&mut runner).unwrap());
    });
}

criterion_group!(benches, bench_generate_random_input, bench_sweep_overhead);
criterion_main!(benches);
