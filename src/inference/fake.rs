// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Scriptable in-memory backend for unit tests

use super::{
    Backend, ElementType, EvalFailure, FeatureDescriptor, ModelSignature, SessionConfig,
    TensorSpec,
};
use crate::error::{BenchError, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct FakeSession {
    pub id: usize,
    pub config: SessionConfig,
}

/// Handles are shared so tests can inspect a backend after moving it into a session
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    pub signature: ModelSignature,
    /// Deliver this many output elements instead of the output spec's count
    pub output_len: Option<usize>,
    /// Sleep inside every evaluation
    pub eval_delay: Option<Duration>,
    pub failures: Arc<Mutex<VecDeque<EvalFailure>>>,
    pub sessions_created: Arc<AtomicUsize>,
    pub evaluations: Arc<AtomicUsize>,
    pub fail_session_creation: Arc<AtomicBool>,
    pub configs: Arc<Mutex<Vec<SessionConfig>>>,
}

impl FakeBackend {
    pub fn new(input_dims: Vec<i64>, output_dims: Vec<i64>) -> Self {
        Self {
            signature: ModelSignature {
                inputs: vec![FeatureDescriptor::tensor(
                    "input",
                    ElementType::Float32,
                    input_dims,
                )],
                outputs: vec![FeatureDescriptor::tensor(
                    "output",
                    ElementType::Float32,
                    output_dims,
                )],
            },
            ..Self::default()
        }
    }

    pub fn fail_next(&self, failure: EvalFailure) {
        self.failures.lock().unwrap().push_back(failure);
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl Backend for FakeBackend {
    type Model = ();
    type Session = FakeSession;
    type Output = Vec<f32>;

    fn name(&self) -> &'static str {
        "fake"
    }

    fn load(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(BenchError::model_load("empty model path"));
        }
        Ok(())
    }

    fn signature(&self, _model: &()) -> ModelSignature {
        self.signature.clone()
    }

    fn create_session(&self, _model: &(), config: &SessionConfig) -> Result<FakeSession> {
        if self.fail_session_creation.load(Ordering::SeqCst) {
            return Err(BenchError::model_load("device unavailable"));
        }
        self.configs.lock().unwrap().push(*config);
        let id = self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            config: *config,
        })
    }

    fn evaluate(
        &self,
        _session: &mut FakeSession,
        input: &TensorSpec,
        data: &[f32],
        output: &TensorSpec,
    ) -> std::result::Result<Vec<f32>, EvalFailure> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.eval_delay {
            std::thread::sleep(delay);
        }
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        assert_eq!(data.len(), input.element_count());
        let len = self.output_len.unwrap_or_else(|| output.element_count());
        Ok(vec![0.25; len])
    }
}
