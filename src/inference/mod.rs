// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Inference session management
//!
//! The engine itself is behind [`Backend`]: it loads a model, reports its
//! signature, builds execution sessions and evaluates one input tensor.
//! [`InferenceSession`] owns the model and the current session, validates
//! the single float input / single float output contract and rebuilds the
//! session when the device is lost.
//!
//! Output data is handed out through [`FloatResultView`], which is only
//! valid for the duration of the result callback.

mod deadline;
#[cfg(feature = "ort")]
pub mod ort_backend;
mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use deadline::DeadlineRunner;
#[cfg(feature = "ort")]
pub use ort_backend::{OrtBackend, OrtModel};
pub use session::{InferenceSession, SessionState};

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Device kind requested from the inference engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DevicePreference {
    /// Let the engine decide (CPU for ONNX Runtime)
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "directx")]
    DirectX,
    #[serde(rename = "directx-high-performance")]
    DirectXHighPerformance,
    #[serde(rename = "directx-min-power")]
    DirectXMinPower,
}

impl DevicePreference {
    /// Whether this kind targets a GPU through DirectX
    pub fn is_accelerated(&self) -> bool {
        matches!(
            self,
            DevicePreference::DirectX
                | DevicePreference::DirectXHighPerformance
                | DevicePreference::DirectXMinPower
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Default => "default",
            DevicePreference::Cpu => "cpu",
            DevicePreference::DirectX => "directx",
            DevicePreference::DirectXHighPerformance => "directx-high-performance",
            DevicePreference::DirectXMinPower => "directx-min-power",
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevicePreference {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(DevicePreference::Default),
            "cpu" => Ok(DevicePreference::Cpu),
            "directx" | "gpu" => Ok(DevicePreference::DirectX),
            "directx-high-performance" => Ok(DevicePreference::DirectXHighPerformance),
            "directx-min-power" => Ok(DevicePreference::DirectXMinPower),
            other => Err(BenchError::Parse(format!("unknown device kind '{}'", other))),
        }
    }
}

/// Execution session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub device: DevicePreference,
    /// Intra-op thread count; 0 keeps the engine default
    pub intra_op_threads: u32,
    /// Adapter used for DirectX device kinds
    pub adapter_index: u32,
}

impl SessionConfig {
    pub fn new(device: DevicePreference) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }
}

/// Element type of a model tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Float32,
    Float16,
    Float64,
    Int32,
    Int64,
    Uint8,
    Other(String),
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Float32 => f.write_str("float32"),
            ElementType::Float16 => f.write_str("float16"),
            ElementType::Float64 => f.write_str("float64"),
            ElementType::Int32 => f.write_str("int32"),
            ElementType::Int64 => f.write_str("int64"),
            ElementType::Uint8 => f.write_str("uint8"),
            ElementType::Other(name) => f.write_str(name),
        }
    }
}

/// What a model input or output carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureKind {
    /// Tensor with raw dims as reported by the engine (may be symbolic/negative)
    Tensor { element: ElementType, dims: Vec<i64> },
    /// Sequence, map or any other non-tensor value
    NonTensor,
}

/// One model input or output as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureDescriptor {
    pub fn tensor(name: impl Into<String>, element: ElementType, dims: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Tensor { element, dims },
        }
    }
}

/// Inputs and outputs of a loaded model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSignature {
    pub inputs: Vec<FeatureDescriptor>,
    pub outputs: Vec<FeatureDescriptor>,
}

impl ModelSignature {
    /// Extract the single float input and single float output.
    ///
    /// Any other signature is an [`BenchError::UnsupportedModelShape`].
    pub fn single_float_io(&self) -> Result<(TensorSpec, TensorSpec)> {
        if self.inputs.len() != 1 {
            return Err(BenchError::unsupported_shape(format!(
                "a single input feature is expected, model has {}",
                self.inputs.len()
            )));
        }
        if self.outputs.len() != 1 {
            return Err(BenchError::unsupported_shape(format!(
                "a single output feature is expected, model has {}",
                self.outputs.len()
            )));
        }
        Ok((
            TensorSpec::from_feature(&self.inputs[0])?,
            TensorSpec::from_feature(&self.outputs[0])?,
        ))
    }
}

/// Name and normalized dimensions of a float tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorSpec {
    pub name: String,
    pub dims: Vec<usize>,
}

impl TensorSpec {
    /// Build a spec, mapping zero or negative (symbolic) dims to 1
    pub fn from_raw(name: impl Into<String>, dims: &[i64]) -> Self {
        Self {
            name: name.into(),
            dims: dims
                .iter()
                .map(|&d| if d <= 0 { 1 } else { d as usize })
                .collect(),
        }
    }

    fn from_feature(feature: &FeatureDescriptor) -> Result<Self> {
        match &feature.kind {
            FeatureKind::Tensor {
                element: ElementType::Float32,
                dims,
            } => Ok(Self::from_raw(feature.name.clone(), dims)),
            FeatureKind::Tensor { element, .. } => Err(BenchError::unsupported_shape(format!(
                "feature '{}' is a {} tensor, float32 is required",
                feature.name, element
            ))),
            FeatureKind::NonTensor => Err(BenchError::unsupported_shape(format!(
                "feature '{}' is not a tensor",
                feature.name
            ))),
        }
    }

    /// Number of elements a buffer for this tensor holds
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Read-only access to float output data produced by the engine
pub trait FloatResultView {
    /// Number of elements
    fn len(&self) -> usize;

    /// Element at `index`, `None` when out of range
    fn element_at(&self, index: usize) -> Option<f32>;

    /// Copy elements starting at `start` into `dest`; returns the count copied
    fn copy_into(&self, start: usize, dest: &mut [f32]) -> usize {
        let mut copied = 0;
        for (offset, slot) in dest.iter_mut().enumerate() {
            match self.element_at(start + offset) {
                Some(value) => *slot = value,
                None => break,
            }
            copied += 1;
        }
        copied
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// View over a borrowed float slice
#[derive(Debug, Clone, Copy)]
pub struct FloatSlice<'a>(pub &'a [f32]);

impl FloatResultView for FloatSlice<'_> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn element_at(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    fn copy_into(&self, start: usize, dest: &mut [f32]) -> usize {
        let src = self.0.get(start..).unwrap_or(&[]);
        let n = src.len().min(dest.len());
        dest[..n].copy_from_slice(&src[..n]);
        n
    }
}

impl FloatResultView for Vec<f32> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn element_at(&self, index: usize) -> Option<f32> {
        self.get(index).copied()
    }

    fn copy_into(&self, start: usize, dest: &mut [f32]) -> usize {
        FloatSlice(self).copy_into(start, dest)
    }
}

/// Why an evaluation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalFailure {
    /// DXGI_ERROR_DEVICE_REMOVED
    #[error("device removed")]
    DeviceRemoved,
    /// DXGI_ERROR_DEVICE_RESET
    #[error("device reset")]
    DeviceReset,
    #[error("{0}")]
    Failed(String),
}

impl EvalFailure {
    /// Device loss is recoverable by rebuilding the session
    pub fn is_device_lost(&self) -> bool {
        matches!(self, EvalFailure::DeviceRemoved | EvalFailure::DeviceReset)
    }
}

/// Inference engine capability
pub trait Backend {
    /// Loaded, device-independent model
    type Model;
    /// Execution session bound to a device and thread configuration
    type Session;
    /// Output data of one evaluation
    type Output: FloatResultView;

    fn name(&self) -> &'static str;

    fn load(&self, path: &Path) -> Result<Self::Model>;

    fn signature(&self, model: &Self::Model) -> ModelSignature;

    fn create_session(&self, model: &Self::Model, config: &SessionConfig) -> Result<Self::Session>;

    /// Bind `data` to `input`, evaluate synchronously and return `output`
    fn evaluate(
        &self,
        session: &mut Self::Session,
        input: &TensorSpec,
        data: &[f32],
        output: &TensorSpec,
    ) -> std::result::Result<Self::Output, EvalFailure>;
}

/// Anything the benchmark driver can time: a session or a wrapper around one
pub trait Runner {
    fn input_shape(&self) -> &[usize];

    fn output_shape(&self) -> &[usize];

    /// Run one inference and hand the output to `on_result` exactly once
    fn run_with(
        &mut self,
        input: &[f32],
        on_result: &mut dyn FnMut(&dyn FloatResultView) -> Result<()>,
    ) -> Result<()>;
}
