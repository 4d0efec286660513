// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Error types for inferbench

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Main error type for inferbench
#[derive(Error, Debug)]
pub enum BenchError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Model does not have exactly one float input and one float output
    #[error("Unsupported model shape: {0}")]
    UnsupportedModelShape(String),

    /// Device was removed or reset during evaluation; the session has been rebuilt
    #[error("Transient device error: {0}")]
    TransientDevice(String),

    /// Any other evaluation failure
    #[error("Inference execution failed: {0}")]
    InferenceExecution(String),

    /// Result callback received an unexpected number of elements
    #[error("Result size mismatch: expected {expected} elements, got {actual}")]
    ResultSizeMismatch { expected: usize, actual: usize },

    /// Input buffer length does not match the input tensor shape
    #[error("Input size mismatch: expected {expected} elements, got {actual}")]
    InputSizeMismatch { expected: usize, actual: usize },

    /// Model could not be loaded or a session could not be built
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// GPU adapter enumeration failed
    #[error("Device enumeration failed: {0}")]
    DeviceEnumeration(String),

    /// Inference call exceeded its deadline
    #[error("Inference timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// Session is still held by a previous call that has not returned
    #[error("Session busy: a previous inference call has not completed")]
    SessionBusy,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl BenchError {
    /// Whether the failed call may succeed if issued again on the same session
    pub fn is_transient(&self) -> bool {
        matches!(self, BenchError::TransientDevice(_))
    }

    /// Create a model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create an unsupported model shape error
    pub fn unsupported_shape(msg: impl Into<String>) -> Self {
        Self::UnsupportedModelShape(msg.into())
    }
}
