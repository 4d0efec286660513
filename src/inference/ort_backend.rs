// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! ONNX Runtime backend
//!
//! The model file is read once and kept in memory so sessions can be
//! rebuilt (thread override, device loss) without touching the disk.
//! DirectX device kinds map to the DirectML execution provider when the
//! `directml` feature is enabled and fall back to CPU otherwise.

use super::{
    Backend, ElementType, EvalFailure, FeatureDescriptor, FeatureKind, ModelSignature,
    SessionConfig, TensorSpec,
};
use crate::error::{BenchError, Result};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};
use std::fmt::Display;
use std::path::Path;

/// HRESULT of DXGI_ERROR_DEVICE_REMOVED as it appears in provider error text
const DXGI_DEVICE_REMOVED: &str = "887a0005";
/// HRESULT of DXGI_ERROR_DEVICE_RESET
const DXGI_DEVICE_RESET: &str = "887a0007";

/// ONNX Runtime inference engine
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Serialized ONNX model plus the signature read when it was loaded
pub struct OrtModel {
    bytes: Vec<u8>,
    signature: ModelSignature,
}

impl Backend for OrtBackend {
    type Model = OrtModel;
    type Session = Session;
    type Output = Vec<f32>;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, path: &Path) -> Result<OrtModel> {
        let bytes = std::fs::read(path)
            .map_err(|e| BenchError::model_load(format!("{}: {}", path.display(), e)))?;

        let probe = Session::builder()
            .map_err(load_error)?
            .commit_from_memory(&bytes)
            .map_err(load_error)?;
        let signature = signature_of(&probe);

        Ok(OrtModel { bytes, signature })
    }

    fn signature(&self, model: &OrtModel) -> ModelSignature {
        model.signature.clone()
    }

    fn create_session(&self, model: &OrtModel, config: &SessionConfig) -> Result<Session> {
        let mut builder = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?;

        if config.intra_op_threads > 0 {
            builder = builder
                .with_intra_threads(config.intra_op_threads as usize)
                .map_err(load_error)?;
        }

        let builder = configure_device(builder, config)?;
        builder.commit_from_memory(&model.bytes).map_err(load_error)
    }

    fn evaluate(
        &self,
        session: &mut Session,
        input: &TensorSpec,
        data: &[f32],
        output: &TensorSpec,
    ) -> std::result::Result<Vec<f32>, EvalFailure> {
        let tensor = Tensor::from_array((input.dims.clone(), data.to_vec())).map_err(classify)?;
        let inputs = vec![(input.name.clone(), SessionInputValue::from(tensor.into_dyn()))];

        let outputs = session.run(inputs).map_err(classify)?;
        for (name, value) in outputs.iter() {
            if name != output.name {
                continue;
            }
            let (_, values) = value.try_extract_tensor::<f32>().map_err(classify)?;
            return Ok(values.to_vec());
        }

        Err(EvalFailure::Failed(format!(
            "model produced no output named '{}'",
            output.name
        )))
    }
}

#[cfg(feature = "directml")]
fn configure_device(builder: SessionBuilder, config: &SessionConfig) -> Result<SessionBuilder> {
    use ort::execution_providers::DirectMLExecutionProvider;

    if !config.device.is_accelerated() {
        return Ok(builder);
    }
    let ep = DirectMLExecutionProvider::default()
        .with_device_id(config.adapter_index as i32)
        .build();
    // DirectML does not support memory patterns or parallel execution
    builder
        .with_memory_pattern(false)
        .map_err(load_error)?
        .with_parallel_execution(false)
        .map_err(load_error)?
        .with_execution_providers([ep])
        .map_err(load_error)
}

#[cfg(not(feature = "directml"))]
fn configure_device(builder: SessionBuilder, config: &SessionConfig) -> Result<SessionBuilder> {
    if config.device.is_accelerated() {
        log::warn!(
            "device '{}' requested but built without the `directml` feature, using CPU",
            config.device
        );
    }
    Ok(builder)
}

fn signature_of(session: &Session) -> ModelSignature {
    ModelSignature {
        inputs: session
            .inputs
            .iter()
            .map(|input| feature_from_value_type(&input.name, &input.input_type))
            .collect(),
        outputs: session
            .outputs
            .iter()
            .map(|output| feature_from_value_type(&output.name, &output.output_type))
            .collect(),
    }
}

fn feature_from_value_type(name: &str, value_type: &ValueType) -> FeatureDescriptor {
    let kind = match value_type {
        ValueType::Tensor { ty, shape, .. } => FeatureKind::Tensor {
            element: element_type(*ty),
            dims: shape.iter().copied().collect(),
        },
        _ => FeatureKind::NonTensor,
    };
    FeatureDescriptor {
        name: name.to_string(),
        kind,
    }
}

fn element_type(ty: TensorElementType) -> ElementType {
    match ty {
        TensorElementType::Float32 => ElementType::Float32,
        TensorElementType::Float16 => ElementType::Float16,
        TensorElementType::Float64 => ElementType::Float64,
        TensorElementType::Int32 => ElementType::Int32,
        TensorElementType::Int64 => ElementType::Int64,
        TensorElementType::Uint8 => ElementType::Uint8,
        other => ElementType::Other(format!("{:?}", other).to_lowercase()),
    }
}

fn load_error<E: Display>(err: E) -> BenchError {
    BenchError::model_load(err.to_string())
}

fn classify<E: Display>(err: E) -> EvalFailure {
    classify_message(&err.to_string())
}

/// Map engine error text to a failure kind; DirectML reports device loss by HRESULT
fn classify_message(message: &str) -> EvalFailure {
    let lower = message.to_ascii_lowercase();
    if lower.contains(DXGI_DEVICE_REMOVED) {
        EvalFailure::DeviceRemoved
    } else if lower.contains(DXGI_DEVICE_RESET) {
        EvalFailure::DeviceReset
    } else {
        EvalFailure::Failed(message.to_string())
    }
}
