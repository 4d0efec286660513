// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2024 NervoSys

//! Timeout-bounded inference
//!
//! Engine calls block and cannot be cancelled. [`DeadlineRunner`] moves each
//! call onto a tokio blocking task and stops waiting after the deadline. A
//! call that overran keeps the session locked until the engine returns;
//! meanwhile further calls fail with [`BenchError::SessionBusy`].

use super::{Backend, FloatResultView, InferenceSession, Runner};
use crate::error::{BenchError, Result};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Runs a session's inference calls with a per-call deadline
pub struct DeadlineRunner<B: Backend> {
    session: Arc<Mutex<InferenceSession<B>>>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    timeout: Duration,
    // Option so Drop can shut down without waiting for a hung call
    runtime: Option<Runtime>,
}

impl<B> DeadlineRunner<B>
where
    B: Backend + Send + 'static,
    B::Model: Send,
    B::Session: Send,
{
    pub fn new(session: InferenceSession<B>, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("inferbench-deadline")
            .build()?;
        Ok(Self {
            input_shape: session.input_shape().to_vec(),
            output_shape: session.output_shape().to_vec(),
            session: Arc::new(Mutex::new(session)),
            timeout,
            runtime: Some(runtime),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    /// Forwarded to [`InferenceSession::set_thread_override`]
    pub fn set_thread_override(&mut self, threads: u32) -> Result<()> {
        lock_session(&self.session)?.set_thread_override(threads)
    }

    /// Run one inference, giving up after the deadline.
    ///
    /// The output is copied off the worker, so `callback` runs on the calling thread.
    pub fn run<F>(&mut self, input: &[f32], callback: F) -> Result<()>
    where
        F: FnOnce(&dyn FloatResultView) -> Result<()>,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| BenchError::Other("deadline runtime shut down".into()))?;

        let session = Arc::clone(&self.session);
        let input = input.to_vec();
        let worker = runtime.spawn_blocking(move || -> Result<Vec<f32>> {
            let mut session = lock_session(&session)?;
            let mut output = Vec::new();
            session.run(&input, |view| {
                output.resize(view.len(), 0.0);
                view.copy_into(0, &mut output);
                Ok(())
            })?;
            Ok(output)
        });

        let timeout = self.timeout;
        let output = match runtime.block_on(async { tokio::time::timeout(timeout, worker).await }) {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(BenchError::InferenceExecution(format!(
                    "inference worker failed: {}",
                    join_err
                )))
            }
            Err(_) => {
                log::warn!("inference call exceeded {} ms deadline", timeout.as_millis());
                return Err(BenchError::Timeout(timeout));
            }
        };

        callback(&output)
    }
}

impl<B> Runner for DeadlineRunner<B>
where
    B: Backend + Send + 'static,
    B::Model: Send,
    B::Session: Send,
{
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn run_with(
        &mut self,
        input: &[f32],
        on_result: &mut dyn FnMut(&dyn FloatResultView) -> Result<()>,
    ) -> Result<()> {
        self.run(input, |view| on_result(view))
    }
}

impl<B: Backend> Drop for DeadlineRunner<B> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn lock_session<B: Backend>(
    session: &Mutex<InferenceSession<B>>,
) -> Result<MutexGuard<'_, InferenceSession<B>>> {
    match session.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(BenchError::SessionBusy),
        // only a panicking result callback poisons the lock
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
    }
}
