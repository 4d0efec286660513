// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Latency benchmark driver
//!
//! Feeds fresh random inputs through a [`Runner`] and times each call,
//! sleeping a fixed delay between calls. A [`Sweep`] repeats this for a
//! list of delays; every call yields one [`LatencySample`].

use crate::error::{BenchError, Result};
use crate::inference::{FloatResultView, Runner};
use rand::Rng;
use std::time::{Duration, Instant};

/// Number of discrete input levels
const INPUT_LEVELS: u16 = 256;

/// One timed inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Sleep between consecutive calls in this sweep
    pub delay: Duration,
    /// Wall-clock duration of the call, result copy included
    pub duration: Duration,
}

/// Progress notifications emitted while a sweep runs
#[derive(Debug)]
pub enum SweepEvent<'a> {
    /// A new delay value starts
    DelayStarted { delay: Duration },
    /// A call completed
    Sample(&'a LatencySample),
    /// A call failed with a transient device error and is re-attempted
    Retry {
        delay: Duration,
        attempt: u32,
        error: &'a BenchError,
    },
}

/// Element count of a tensor with the given dims
pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Random input for `shape` using the thread-local RNG
pub fn generate_random_input(shape: &[usize]) -> Vec<f32> {
    generate_random_input_with(&mut rand::thread_rng(), shape)
}

/// Random input for `shape`: one of 256 evenly spaced levels in `[-0.5, 0.5)`
pub fn generate_random_input_with<R: Rng + ?Sized>(rng: &mut R, shape: &[usize]) -> Vec<f32> {
    (0..shape_size(shape))
        .map(|_| {
            let level = rng.gen_range(0..INPUT_LEVELS);
            f32::from(level) / f32::from(INPUT_LEVELS) - 0.5
        })
        .collect()
}

/// Copy a result view into `dest`, which must match it in length
pub fn copy_result(view: &dyn FloatResultView, dest: &mut [f32]) -> Result<()> {
    let expected = dest.len();
    if view.len() != expected {
        return Err(BenchError::ResultSizeMismatch {
            expected,
            actual: view.len(),
        });
    }
    let copied = view.copy_into(0, dest);
    if copied != expected {
        return Err(BenchError::ResultSizeMismatch {
            expected,
            actual: copied,
        });
    }
    Ok(())
}

/// Delay sweep settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Calls per delay value
    pub iterations: usize,
    /// Delay values, run in order
    pub delays: Vec<Duration>,
    /// Re-attempts of a call after a transient device error; 0 fails the sweep
    pub transient_retries: u32,
}

impl Sweep {
    pub fn new(iterations: usize, delays: Vec<Duration>) -> Self {
        Self {
            iterations,
            delays,
            transient_retries: 0,
        }
    }

    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    /// Number of samples a successful sweep produces
    pub fn total_samples(&self) -> usize {
        self.iterations * self.delays.len()
    }

    pub fn run<R: Runner + ?Sized>(&self, runner: &mut R) -> Result<Vec<LatencySample>> {
        self.run_observed(runner, |_| {})
    }

    /// Run every delay value in order, reporting progress to `observe`
    pub fn run_observed<R, F>(&self, runner: &mut R, mut observe: F) -> Result<Vec<LatencySample>>
    where
        R: Runner + ?Sized,
        F: FnMut(SweepEvent<'_>),
    {
        let mut samples = Vec::with_capacity(self.total_samples());

        for &delay in &self.delays {
            observe(SweepEvent::DelayStarted { delay });
            log::debug!(
                "sweep: {} iterations at {} ms delay",
                self.iterations,
                delay.as_millis()
            );

            for _ in 0..self.iterations {
                let duration = self.measure_with_retries(runner, delay, &mut observe)?;
                let sample = LatencySample { delay, duration };
                observe(SweepEvent::Sample(&sample));
                samples.push(sample);

                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }

        Ok(samples)
    }

    fn measure_with_retries<R, F>(
        &self,
        runner: &mut R,
        delay: Duration,
        observe: &mut F,
    ) -> Result<Duration>
    where
        R: Runner + ?Sized,
        F: FnMut(SweepEvent<'_>),
    {
        let mut attempt = 0;
        loop {
            match measure_once(runner) {
                Err(e) if e.is_transient() && attempt < self.transient_retries => {
                    attempt += 1;
                    log::warn!("transient failure, retry {}/{}: {}", attempt, self.transient_retries, e);
                    observe(SweepEvent::Retry {
                        delay,
                        attempt,
                        error: &e,
                    });
                }
                result => return result,
            }
        }
    }
}

/// Time one call with a fresh random input and output buffer
fn measure_once<R: Runner + ?Sized>(runner: &mut R) -> Result<Duration> {
    let input = generate_random_input(runner.input_shape());
    let mut output = vec![0.0f32; shape_size(runner.output_shape())];
    let start = Instant::now();
    runner.run_with(&input, &mut |view: &dyn FloatResultView| copy_result(view, &mut output))?;
    Ok(start.elapsed())
}

/// Run `iterations` timed calls for each delay in `delays`, without retries
pub fn run_sweep<R: Runner + ?Sized>(
    runner: &mut R,
    iterations: usize,
    delays: &[Duration],
) -> Result<Vec<LatencySample>> {
    Sweep::new(iterations, delays.to_vec()).run(runner)
}
