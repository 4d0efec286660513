// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! # inferbench
//!
//! GPU adapter inventory and inference latency benchmarking.
//!
//! The benchmark loads a single-input / single-output float model, runs it
//! repeatedly with random inputs, and measures each call while varying the
//! idle time between calls. This exposes latency effects of GPU power
//! management and clock ramp-up that a tight loop hides.
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "ort")]
//! # fn main() -> inferbenchlib::Result<()> {
//! use inferbenchlib::bench::Sweep;
//! use inferbenchlib::inference::{DevicePreference, InferenceSession, OrtBackend};
//! use std::time::Duration;
//!
//! let device = if inferbenchlib::gpu::report_available() {
//!     DevicePreference::DirectX
//! } else {
//!     DevicePreference::Default
//! };
//! let mut session = InferenceSession::new(OrtBackend::new(), "model.onnx", device)?;
//!
//! let sweep = Sweep::new(100, vec![Duration::ZERO, Duration::from_millis(50)]);
//! let samples = sweep.run(&mut session)?;
//! inferbenchlib::report::write_durations("./winml_durations.txt", &samples)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ort"))]
//! # fn main() {}
//! ```

pub mod bench;
pub mod config;
pub mod error;
pub mod gpu;
pub mod inference;
pub mod report;

pub use bench::{generate_random_input, run_sweep, shape_size, LatencySample, Sweep, SweepEvent};
pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use gpu::{enumerate_devices, DeviceDescriptor, GpuPreference};
pub use inference::{
    Backend, DeadlineRunner, DevicePreference, FloatResultView, InferenceSession, Runner,
    SessionConfig, TensorSpec,
};
