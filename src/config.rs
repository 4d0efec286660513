// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Benchmark configuration
//!
//! Loaded from an optional TOML file; every field has a default matching
//! the reference harness (100 iterations at 0, 50, 100 and 150 ms).

use crate::bench::Sweep;
use crate::error::{BenchError, Result};
use crate::inference::{DevicePreference, SessionConfig};
use crate::report::DEFAULT_DURATIONS_PATH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Benchmark settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Timed calls per delay value
    pub iterations: usize,
    /// Delays between calls, in milliseconds
    pub delays_ms: Vec<u64>,
    /// Durations file
    pub output: PathBuf,
    /// Intra-op thread override (0 = engine default)
    pub intra_op_threads: u32,
    /// Device kind; unset picks DirectX when a GPU is present
    pub device: Option<DevicePreference>,
    /// Adapter used for DirectX device kinds
    pub adapter_index: u32,
    /// Per-call deadline in milliseconds; unset runs calls inline
    pub timeout_ms: Option<u64>,
    /// Re-attempts after a transient device error
    pub transient_retries: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            delays_ms: vec![0, 50, 100, 150],
            output: PathBuf::from(DEFAULT_DURATIONS_PATH),
            intra_op_threads: 0,
            device: None,
            adapter_index: 0,
            timeout_ms: None,
            transient_retries: 0,
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(BenchError::Config("iterations must be at least 1".into()));
        }
        if self.delays_ms.is_empty() {
            return Err(BenchError::Config("at least one delay is required".into()));
        }
        if self.timeout_ms == Some(0) {
            return Err(BenchError::Config("timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays_ms.iter().copied().map(Duration::from_millis).collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Device to request, given whether a usable GPU was found
    pub fn resolve_device(&self, gpu_available: bool) -> DevicePreference {
        self.device.unwrap_or(if gpu_available {
            DevicePreference::DirectX
        } else {
            DevicePreference::Default
        })
    }

    /// Session settings for the resolved device, threads and adapter
    pub fn session_config(&self, gpu_available: bool) -> SessionConfig {
        SessionConfig {
            device: self.resolve_device(gpu_available),
            intra_op_threads: self.intra_op_threads,
            adapter_index: self.adapter_index,
        }
    }

    pub fn sweep(&self) -> Sweep {
        Sweep::new(self.iterations, self.delays()).with_transient_retries(self.transient_retries)
    }
}
