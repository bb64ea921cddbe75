//! Execution core: single-flight, deadline-bounded access to one native session.
//!
//! `run_inference` never panics and never returns `Err`; every failure is an
//! `InferenceResult::Failure`. Worst-case wall time for one call is
//! `timeout + wait_grace + cancel_cooldown`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use super::backend::NativeBackend;
use super::config::{EngineTuning, GenerationParams, InferenceConfig};
use super::error::{EngineError, FailureKind, NativeErrorCode};
use super::registry::{SessionHandle, SessionRegistry, UnloadOutcome};
use super::result::InferenceResult;
use super::session::{NativeSession, SessionState};
use super::worker::{CancelToken, Job, SessionWorker};
use crate::parser::{parse_raw, ParserLimits, RawOutput};
use crate::telemetry;

/// Identifier of this runtime build, reported in diagnostics.
pub const RUNTIME_ID: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Point-in-time view of the engine. Carries no prompt or output text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineDiagnostics {
    pub engine_id: String,
    pub runtime_id: String,
    pub available: bool,
    pub handle: SessionHandle,
    pub session_state: SessionState,
    pub running: bool,
}

pub struct ExecutionCore {
    registry: Arc<SessionRegistry>,
    handle: SessionHandle,
    session: Arc<NativeSession>,
    worker: SessionWorker,
    loaded: AtomicBool,
    flight: Mutex<()>,
    active_cancel: Mutex<Option<CancelToken>>,
    unloaded: Mutex<Option<UnloadOutcome>>,
    tuning: EngineTuning,
    limits: ParserLimits,
}

impl ExecutionCore {
    /// Load `backend` into a private registry and start its worker.
    pub fn new(
        backend: Box<dyn NativeBackend>,
        tuning: EngineTuning,
        limits: ParserLimits,
    ) -> Result<Self, EngineError> {
        Self::with_registry(Arc::new(SessionRegistry::new()), backend, tuning, limits)
    }

    /// Load `backend` into a shared registry.
    pub fn with_registry(
        registry: Arc<SessionRegistry>,
        backend: Box<dyn NativeBackend>,
        tuning: EngineTuning,
        limits: ParserLimits,
    ) -> Result<Self, EngineError> {
        let handle = registry.insert(backend)?;
        let Some(session) = registry.lookup(handle) else {
            return Err(EngineError::ModelLoad("session vanished during load".into()));
        };
        let worker = match SessionWorker::spawn(Arc::clone(&registry), handle) {
            Ok(worker) => worker,
            Err(e) => {
                registry.unload(handle, tuning.unload_grace);
                return Err(e);
            }
        };
        tracing::info!(
            engine_id = session.engine_id(),
            handle = %handle,
            "native session loaded"
        );
        Ok(Self {
            registry,
            handle,
            session,
            worker,
            loaded: AtomicBool::new(true),
            flight: Mutex::new(()),
            active_cancel: Mutex::new(None),
            unloaded: Mutex::new(None),
            tuning,
            limits,
        })
    }

    pub fn engine_id(&self) -> &'static str {
        self.session.engine_id()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn tuning(&self) -> EngineTuning {
        self.tuning
    }

    /// True while a session is loaded and not poisoned.
    pub fn is_available(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Run one inference. Contention fails fast with `Busy`.
    pub fn run_inference(&self, prompt: &str, config: &InferenceConfig) -> InferenceResult {
        let start = Instant::now();
        let result = self.run_inner(prompt, config, start);
        telemetry::record_inference(result.label(), result.elapsed_ms());
        result
    }

    fn run_inner(&self, prompt: &str, config: &InferenceConfig, start: Instant) -> InferenceResult {
        if !self.is_available() {
            return failure(FailureKind::NotAvailable, "no model session loaded", start);
        }
        let Some(_flight) = self.flight.try_lock() else {
            tracing::debug!(handle = %self.handle, "inference already in flight; busy");
            return failure(FailureKind::Busy, "another inference is in flight", start);
        };
        // Shutdown may have run between the first check and the lock.
        if !self.is_available() {
            return failure(FailureKind::NotAvailable, "session unloaded", start);
        }

        let params = GenerationParams::from_config(config);
        let cancel = CancelToken::new();
        *self.active_cancel.lock() = Some(cancel.clone());

        let (reply_tx, reply_rx) = mpsc::channel();
        let submitted = self.worker.submit(Job {
            prompt: prompt.to_string(),
            params: params.clone(),
            cancel: cancel.clone(),
            reply: reply_tx,
        });
        if !submitted {
            self.active_cancel.lock().take();
            self.loaded.store(false, Ordering::Release);
            return failure(FailureKind::NotAvailable, "session worker stopped", start);
        }

        let deadline = params.timeout + self.tuning.wait_grace;
        let result = match reply_rx.recv_timeout(deadline) {
            Ok(raw) => self.interpret(&raw, start),
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                self.session.signal_cancel();
                // Give the native loop a chance to see the flag before the
                // next caller can get in.
                std::thread::sleep(self.tuning.cancel_cooldown);
                tracing::warn!(
                    handle = %self.handle,
                    deadline_ms = deadline.as_millis() as u64,
                    "inference deadline elapsed; cancel signalled"
                );
                failure(
                    FailureKind::Timeout,
                    format!("no result within {} ms", deadline.as_millis()),
                    start,
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.loaded.store(false, Ordering::Release);
                tracing::error!(handle = %self.handle, "session worker dropped the reply");
                failure(FailureKind::NotAvailable, "session worker exited", start)
            }
        };
        self.active_cancel.lock().take();
        result
    }

    fn interpret(&self, raw: &str, start: Instant) -> InferenceResult {
        match parse_raw(raw, &self.limits) {
            RawOutput::Error { code, message } => {
                if code == NativeErrorCode::Timeout {
                    tracing::warn!(handle = %self.handle, %message, "native decode deadline");
                    return failure(FailureKind::Timeout, message, start);
                }
                if code.is_poisoning() {
                    self.loaded.store(false, Ordering::Release);
                    tracing::warn!(handle = %self.handle, code = %code, "session poisoned; engine unavailable");
                } else {
                    tracing::warn!(handle = %self.handle, code = %code, %message, "native error");
                }
                failure(FailureKind::Native(code), message, start)
            }
            RawOutput::Payload { text, .. } if text.trim().is_empty() => {
                failure(FailureKind::EmptyOutput, "native call returned no text", start)
            }
            RawOutput::Payload { token_count, ttft_ms, text } => InferenceResult::Success {
                raw_output: text,
                time_to_first_token_ms: ttft_ms,
                total_time_ms: elapsed_ms(start),
                tokens_generated: token_count,
            },
        }
    }

    /// Signal the in-flight call, if any, to stop.
    pub fn cancel(&self) {
        if let Some(token) = self.active_cancel.lock().as_ref() {
            token.cancel();
        }
        self.session.signal_cancel();
    }

    /// Unload the session. Idempotent and safe to call concurrently with
    /// in-flight calls; every caller gets the first outcome.
    pub fn shutdown(&self) -> UnloadOutcome {
        let mut unloaded = self.unloaded.lock();
        if let Some(outcome) = *unloaded {
            return outcome;
        }
        self.loaded.store(false, Ordering::Release);
        self.cancel();
        let outcome = self.registry.unload(self.handle, self.tuning.unload_grace);
        self.worker.stop();
        telemetry::record_unload(outcome);
        tracing::info!(handle = %self.handle, outcome = ?outcome, "native session unloaded");
        *unloaded = Some(outcome);
        outcome
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        EngineDiagnostics {
            engine_id: self.engine_id().to_string(),
            runtime_id: RUNTIME_ID.to_string(),
            available: self.is_available(),
            handle: self.handle,
            session_state: self.session.state(),
            running: self.session.is_running(),
        }
    }
}

impl Drop for ExecutionCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn failure(kind: FailureKind, message: impl Into<String>, start: Instant) -> InferenceResult {
    InferenceResult::failure(kind, message, elapsed_ms(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::replay::{ReplayBackend, ReplayStep};
    use std::time::Duration;

    fn core(backend: ReplayBackend) -> ExecutionCore {
        ExecutionCore::new(Box::new(backend), EngineTuning::default(), ParserLimits::default()).unwrap()
    }

    #[test]
    fn success_carries_parsed_metrics() {
        let engine = core(ReplayBackend::constant("{\"a\":1}"));
        match engine.run_inference("p", &InferenceConfig::default()) {
            InferenceResult::Success { raw_output, tokens_generated, time_to_first_token_ms, .. } => {
                assert_eq!(raw_output, "{\"a\":1}");
                assert_eq!(tokens_generated, Some(2));
                assert!(time_to_first_token_ms.is_some());
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn poisoning_native_error_marks_unavailable() {
        let engine = core(ReplayBackend::sequence(vec![ReplayStep::Fail(
            NativeErrorCode::Poisoned,
            "gone".into(),
        )]));
        let result = engine.run_inference("p", &InferenceConfig::default());
        assert_eq!(result.failure_kind(), Some(&FailureKind::Native(NativeErrorCode::Poisoned)));
        assert!(!engine.is_available());
        let again = engine.run_inference("p", &InferenceConfig::default());
        assert_eq!(again.failure_kind(), Some(&FailureKind::NotAvailable));
    }

    #[test]
    fn non_poisoning_error_keeps_engine_available() {
        let engine = core(ReplayBackend::sequence(vec![ReplayStep::Fail(
            NativeErrorCode::ContextOverflow,
            "prompt too long".into(),
        )]));
        let result = engine.run_inference("p", &InferenceConfig::default());
        assert_eq!(
            result.failure_kind(),
            Some(&FailureKind::Native(NativeErrorCode::ContextOverflow))
        );
        assert!(engine.is_available());
    }

    #[test]
    fn whitespace_output_is_empty_output() {
        let engine = core(ReplayBackend::constant("   "));
        let result = engine.run_inference("p", &InferenceConfig::default());
        assert_eq!(result.failure_kind(), Some(&FailureKind::EmptyOutput));
    }

    #[test]
    fn shutdown_is_idempotent_and_frees() {
        let backend = ReplayBackend::constant("{}");
        let probes = backend.probes();
        let engine = core(backend);
        assert_eq!(engine.shutdown(), UnloadOutcome::Freed);
        assert_eq!(engine.shutdown(), UnloadOutcome::Freed);
        assert!(probes.released());
        assert!(!engine.is_available());
        assert_eq!(engine.diagnostics().session_state, SessionState::Freed);
    }

    #[test]
    fn diagnostics_report_engine_and_runtime() {
        let engine = core(ReplayBackend::constant("{}"));
        let diag = engine.diagnostics();
        assert_eq!(diag.engine_id, "replay");
        assert!(diag.runtime_id.starts_with("sentinel-core/"));
        assert!(diag.available);
        assert_eq!(diag.session_state, SessionState::Loaded);
    }

    #[test]
    fn native_deadline_maps_to_timeout() {
        let engine = core(ReplayBackend::constant("x".repeat(400)).with_token_delay(Duration::from_millis(5)));
        let config = InferenceConfig { timeout_ms: 30, ..Default::default() };
        let result = engine.run_inference("p", &config);
        assert_eq!(result.failure_kind(), Some(&FailureKind::Timeout));
        assert!(engine.is_available());
    }
}
