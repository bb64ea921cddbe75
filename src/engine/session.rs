//! Native session: one loaded backend plus its cancel/poison/running flags.
//!
//! The backend sits behind an `RwLock<Option<..>>`. A decode holds the read
//! side for its whole duration; releasing takes the write side with a bounded
//! wait. A release that cannot get the write side in time leaves the backend
//! in place (leaked-but-not-corrupted) instead of freeing memory in use.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::backend::NativeBackend;
use super::config::GenerationParams;
use super::error::{NativeError, NativeErrorCode};

/// Lifecycle state of a native session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Loaded,
    /// Unload completed and native memory was released.
    Freed,
    /// Unload gave up waiting; memory stays owned by the in-flight call.
    Leaked,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Loaded,
            1 => Self::Freed,
            _ => Self::Leaked,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Loaded => 0,
            Self::Freed => 1,
            Self::Leaked => 2,
        }
    }
}

/// Sets `running` for the lifetime of one decode.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct NativeSession {
    engine_id: &'static str,
    backend: RwLock<Option<Box<dyn NativeBackend>>>,
    cancel_flag: AtomicBool,
    poisoned: AtomicBool,
    running: AtomicBool,
    state: AtomicU8,
}

impl NativeSession {
    pub(crate) fn new(backend: Box<dyn NativeBackend>) -> Self {
        Self {
            engine_id: backend.engine_id(),
            backend: RwLock::new(Some(backend)),
            cancel_flag: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            running: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Loaded.as_u8()),
        }
    }

    pub(crate) fn engine_id(&self) -> &'static str {
        self.engine_id
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the current decode to stop. No-op once poisoned.
    pub(crate) fn signal_cancel(&self) {
        if self.is_poisoned() {
            return;
        }
        self.cancel_flag.store(true, Ordering::Release);
    }

    /// Run one decode and encode the outcome in the native wire format:
    /// `TOKENS|TTFT_MS|text` on success, `ERR|CODE|message` otherwise.
    pub(crate) fn execute(
        &self,
        prompt: &str,
        params: &GenerationParams,
        call_cancelled: &AtomicBool,
    ) -> String {
        if self.is_poisoned() {
            return poisoned("session has been unloaded (poisoned handle)");
        }

        let _running = RunningGuard::enter(&self.running);

        // Unload may have poisoned between the first check and the guard.
        if self.is_poisoned() {
            return poisoned("session unloaded during inference setup");
        }

        // A pending writer means an unload is in progress: never queue behind it.
        let Some(slot) = self.backend.try_read() else {
            return poisoned("session unload in progress");
        };
        let Some(backend) = slot.as_ref() else {
            return NativeError::new(NativeErrorCode::NullContext, "native resources released")
                .to_wire();
        };

        self.cancel_flag.store(false, Ordering::Release);
        let is_cancelled = || {
            self.cancel_flag.load(Ordering::Relaxed)
                || self.poisoned.load(Ordering::Relaxed)
                || call_cancelled.load(Ordering::Relaxed)
        };

        match backend.generate(prompt, params, &is_cancelled) {
            Ok(generation) => match generation.stop {
                super::backend::StopReason::Cancelled => NativeError::new(
                    NativeErrorCode::Cancelled,
                    format!("cancelled after {} tokens", generation.tokens_generated),
                )
                .to_wire(),
                super::backend::StopReason::Timeout => NativeError::new(
                    NativeErrorCode::Timeout,
                    format!("decode deadline hit after {} tokens", generation.tokens_generated),
                )
                .to_wire(),
                _ => format!(
                    "{}|{}|{}",
                    generation.tokens_generated, generation.ttft_ms, generation.text
                ),
            },
            Err(e) => e.to_wire(),
        }
    }

    /// Poison, cancel, then free within `grace` or leave the memory alone.
    ///
    /// Only the registry calls this. Repeated calls return the first outcome.
    pub(super) fn release(&self, grace: Duration) -> SessionState {
        self.poisoned.store(true, Ordering::Release);
        self.cancel_flag.store(true, Ordering::Release);

        let current = self.state();
        if current != SessionState::Loaded {
            return current;
        }

        match self.backend.try_write_for(grace) {
            Some(mut slot) => {
                drop(slot.take());
                self.state.store(SessionState::Freed.as_u8(), Ordering::Release);
                SessionState::Freed
            }
            None => {
                self.state.store(SessionState::Leaked.as_u8(), Ordering::Release);
                SessionState::Leaked
            }
        }
    }
}

fn poisoned(message: &str) -> String {
    NativeError::new(NativeErrorCode::Poisoned, message).to_wire()
}
