// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Owned model + execution session with rebuild-on-device-loss

use super::{
    Backend, DevicePreference, EvalFailure, FloatResultView, Runner, SessionConfig, TensorSpec,
};
use crate::error::{BenchError, Result};
use std::path::Path;

/// Lifecycle state of the execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session can evaluate
    Ready,
    /// Session is being (or failed to be) rebuilt; the next call retries the rebuild
    Rebuilding,
}

/// A loaded single-input / single-output float model and its execution session
pub struct InferenceSession<B: Backend> {
    backend: B,
    model: B::Model,
    session: B::Session,
    config: SessionConfig,
    input: TensorSpec,
    output: TensorSpec,
    state: SessionState,
    rebuilds: u64,
}

impl<B: Backend> InferenceSession<B> {
    /// Load `model_path` and bind a session to `device` with default threading
    pub fn new(backend: B, model_path: impl AsRef<Path>, device: DevicePreference) -> Result<Self> {
        Self::with_config(backend, model_path, SessionConfig::new(device))
    }

    /// Load `model_path` and bind a session using `config`
    pub fn with_config(
        backend: B,
        model_path: impl AsRef<Path>,
        config: SessionConfig,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = backend.load(model_path)?;
        let (input, output) = backend.signature(&model).single_float_io()?;
        let session = backend.create_session(&model, &config)?;

        log::debug!(
            "{} session for {}: input '{}' {:?}, output '{}' {:?}, device {}",
            backend.name(),
            model_path.display(),
            input.name,
            input.dims,
            output.name,
            output.dims,
            config.device
        );

        Ok(Self {
            backend,
            model,
            session,
            config,
            input,
            output,
            state: SessionState::Ready,
            rebuilds: 0,
        })
    }

    /// Override the intra-op thread count (0 = engine default) and rebuild the session
    pub fn set_thread_override(&mut self, threads: u32) -> Result<()> {
        self.config.intra_op_threads = threads;
        self.rebuild()
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input.dims
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output.dims
    }

    pub fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    pub fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of times the execution session was rebuilt after construction
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Run one inference.
    ///
    /// `input` must hold exactly as many elements as the input shape. On
    /// success `callback` sees the output exactly once. A lost device
    /// rebuilds the session and fails with [`BenchError::TransientDevice`];
    /// retrying is left to the caller.
    pub fn run<F>(&mut self, input: &[f32], callback: F) -> Result<()>
    where
        F: FnOnce(&dyn FloatResultView) -> Result<()>,
    {
        let expected = self.input.element_count();
        if input.len() != expected {
            return Err(BenchError::InputSizeMismatch {
                expected,
                actual: input.len(),
            });
        }

        if self.state == SessionState::Rebuilding {
            self.rebuild()?;
        }

        match self
            .backend
            .evaluate(&mut self.session, &self.input, input, &self.output)
        {
            Ok(result) => callback(&result),
            Err(failure) if failure.is_device_lost() => {
                log::warn!("{} evaluation failed: {}, rebuilding session", self.backend.name(), failure);
                if let Err(e) = self.rebuild() {
                    log::warn!("session rebuild failed, will retry on next call: {}", e);
                }
                Err(BenchError::TransientDevice(failure.to_string()))
            }
            Err(EvalFailure::Failed(msg)) => Err(BenchError::InferenceExecution(msg)),
            Err(failure) => Err(BenchError::InferenceExecution(failure.to_string())),
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        self.state = SessionState::Rebuilding;
        self.session = self.backend.create_session(&self.model, &self.config)?;
        self.state = SessionState::Ready;
        self.rebuilds += 1;
        log::debug!(
            "rebuilt {} session (threads: {}, rebuilds: {})",
            self.backend.name(),
            self.config.intra_op_threads,
            self.rebuilds
        );
        Ok(())
    }
}

impl<B: Backend> Runner for InferenceSession<B> {
    fn input_shape(&self) -> &[usize] {
        InferenceSession::input_shape(self)
    }

    fn output_shape(&self) -> &[usize] {
        InferenceSession::output_shape(self)
    }

    fn run_with(
        &mut self,
        input: &[f32],
        on_result: &mut dyn FnMut(&dyn FloatResultView) -> Result<()>,
    ) -> Result<()> {
        self.run(input, |view| on_result(view))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::fake::FakeBackend;
    use crate::inference::{ElementType, FeatureDescriptor};
    use std::sync::atomic::Ordering;

    fn session(backend: &FakeBackend) -> InferenceSession<FakeBackend> {
        InferenceSession::new(backend.clone(), "model.onnx", DevicePreference::DirectX).unwrap()
    }

    #[test]
    fn test_construction_caches_normalized_shapes() {
        let backend = FakeBackend::new(vec![-1, 3, 2, 2], vec![1, 1000]);
        let session = session(&backend);
        assert_eq!(session.input_shape(), &[1, 3, 2, 2]);
        assert_eq!(session.output_shape(), &[1, 1000]);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.config().device, DevicePreference::DirectX);
        assert_eq!(backend.sessions_created(), 1);
    }

    #[test]
    fn test_two_inputs_fail_before_evaluation() {
        let mut backend = FakeBackend::new(vec![1, 4], vec![1, 2]);
        backend
            .signature
            .inputs
            .push(FeatureDescriptor::tensor("mask", ElementType::Float32, vec![1, 4]));

        let result = InferenceSession::new(backend.clone(), "model.onnx", DevicePreference::Default);
        assert!(matches!(result, Err(BenchError::UnsupportedModelShape(_))));
        assert_eq!(backend.evaluations(), 0);
        assert_eq!(backend.sessions_created(), 0);
    }

    #[test]
    fn test_load_failure_propagates() {
        let backend = FakeBackend::new(vec![1], vec![1]);
        let result = InferenceSession::new(backend, "", DevicePreference::Default);
        assert!(matches!(result, Err(BenchError::ModelLoad(_))));
    }

    #[test]
    fn test_thread_override_rebuilds_and_keeps_shapes() {
        let backend = FakeBackend::new(vec![1, 3, 224, 224], vec![1, 1000]);
        let mut session = session(&backend);
        let input_before = session.input_shape().to_vec();
        let output_before = session.output_shape().to_vec();

        session.set_thread_override(4).unwrap();
        assert_eq!(session.input_shape(), input_before.as_slice());
        assert_eq!(session.output_shape(), output_before.as_slice());
        assert_eq!(session.config().intra_op_threads, 4);
        assert_eq!(session.rebuild_count(), 1);
        assert_eq!(backend.sessions_created(), 2);
        assert_eq!(session.session.id, 1);
        assert_eq!(session.session.config.intra_op_threads, 4);

        session.set_thread_override(0).unwrap();
        let configs = backend.configs.lock().unwrap();
        let threads: Vec<_> = configs.iter().map(|c| c.intra_op_threads).collect();
        assert_eq!(threads, vec![0, 4, 0]);
    }

    #[test]
    fn test_run_invokes_callback_once_with_output() {
        let backend = FakeBackend::new(vec![1, 3, 2, 2], vec![1, 10]);
        let mut session = session(&backend);
        let mut calls = 0;
        let mut out = vec![0.0f32; 10];
        session
            .run(&[0.0; 12], |view| {
                calls += 1;
                assert_eq!(view.len(), 10);
                view.copy_into(0, &mut out);
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert!(out.iter().all(|&x| x == 0.25));
    }

    #[test]
    fn test_run_rejects_wrong_input_length() {
        let backend = FakeBackend::new(vec![1, 3, 2, 2], vec![1, 10]);
        let mut session = session(&backend);
        let err = session.run(&[0.0; 11], |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            BenchError::InputSizeMismatch {
                expected: 12,
                actual: 11
            }
        ));
        assert_eq!(backend.evaluations(), 0);
    }

    #[test]
    fn test_callback_error_propagates() {
        let backend = FakeBackend::new(vec![1], vec![1]);
        let mut session = session(&backend);
        let err = session
            .run(&[0.0], |_| Err(BenchError::Other("sink full".into())))
            .unwrap_err();
        assert_eq!(err.to_string(), "sink full");
    }

    #[test]
    fn test_device_removed_rebuilds_and_recovers() {
        let backend = FakeBackend::new(vec![1, 4], vec![1, 2]);
        let mut session = session(&backend);
        backend.fail_next(EvalFailure::DeviceRemoved);

        let err = session.run(&[0.0; 4], |_| Ok(())).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(session.rebuild_count(), 1);
        assert_eq!(session.state(), SessionState::Ready);

        // same object keeps working
        session.run(&[0.0; 4], |_| Ok(())).unwrap();
        session.run(&[0.0; 4], |_| Ok(())).unwrap();
        assert_eq!(backend.evaluations(), 3);
        assert_eq!(backend.sessions_created(), 2);
    }

    #[test]
    fn test_device_reset_is_transient() {
        let backend = FakeBackend::new(vec![1], vec![1]);
        let mut session = session(&backend);
        backend.fail_next(EvalFailure::DeviceReset);
        let err = session.run(&[0.0], |_| Ok(())).unwrap_err();
        assert!(matches!(err, BenchError::TransientDevice(_)));
    }

    #[test]
    fn test_other_failure_does_not_rebuild() {
        let backend = FakeBackend::new(vec![1], vec![1]);
        let mut session = session(&backend);
        backend.fail_next(EvalFailure::Failed("shape inference failed".into()));
        let err = session.run(&[0.0], |_| Ok(())).unwrap_err();
        assert!(matches!(err, BenchError::InferenceExecution(ref m) if m == "shape inference failed"));
        assert_eq!(session.rebuild_count(), 0);
        assert_eq!(backend.sessions_created(), 1);
    }

    #[test]
    fn test_failed_rebuild_is_retried_on_next_call() {
        let backend = FakeBackend::new(vec![1], vec![1]);
        let mut session = session(&backend);
        backend.fail_next(EvalFailure::DeviceRemoved);
        backend.fail_session_creation.store(true, Ordering::SeqCst);

        let err = session.run(&[0.0], |_| Ok(())).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(session.state(), SessionState::Rebuilding);

        // device still gone
        let err = session.run(&[0.0], |_| Ok(())).unwrap_err();
        assert!(matches!(err, BenchError::ModelLoad(_)));

        backend.fail_session_creation.store(false, Ordering::SeqCst);
        session.run(&[0.0], |_| Ok(())).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.rebuild_count(), 1);
    }
}
