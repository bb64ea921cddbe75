//! Generation-tagged session registry.
//!
//! The registry is the only owner allowed to release a native session. A
//! handle encodes `(generation << 32) | slot`; both counters only ever grow,
//! so a handle from an unloaded session can never alias a newer one and any
//! lookup with it resolves to nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::backend::NativeBackend;
use super::error::EngineError;
use super::session::{NativeSession, SessionState};

/// Opaque, generation-tagged session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    fn compose(generation: u32, slot: u32) -> Self {
        Self(((generation as u64) << 32) | slot as u64)
    }

    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn slot(self) -> u32 {
        self.0 as u32
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation(), self.slot())
    }
}

/// Result of an unload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnloadOutcome {
    /// Native memory released.
    Freed,
    /// The in-flight call outlived the grace period; memory was not touched.
    Leaked,
    /// Handle was unknown or already unloaded.
    NotFound,
}

struct Counters {
    generation: u32,
    slot: u32,
}

/// Live sessions keyed by handle.
pub struct SessionRegistry {
    sessions: DashMap<SessionHandle, Arc<NativeSession>>,
    counters: Mutex<Counters>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            counters: Mutex::new(Counters { generation: 0, slot: 0 }),
        }
    }

    /// Start counters at explicit values. Used to exercise wrap refusal.
    pub fn with_counters(generation: u32, slot: u32) -> Self {
        Self {
            sessions: DashMap::new(),
            counters: Mutex::new(Counters { generation, slot }),
        }
    }

    /// Register a freshly loaded backend and hand out its handle.
    ///
    /// Refuses the load when either counter would wrap.
    pub fn insert(&self, backend: Box<dyn NativeBackend>) -> Result<SessionHandle, EngineError> {
        let handle = {
            let mut counters = self.counters.lock();
            let generation = counters.generation.checked_add(1).ok_or(EngineError::RegistryExhausted)?;
            let slot = counters.slot.checked_add(1).ok_or(EngineError::RegistryExhausted)?;
            counters.generation = generation;
            counters.slot = slot;
            SessionHandle::compose(generation, slot)
        };
        self.sessions.insert(handle, Arc::new(NativeSession::new(backend)));
        Ok(handle)
    }

    pub(crate) fn lookup(&self, handle: SessionHandle) -> Option<Arc<NativeSession>> {
        self.sessions.get(&handle).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.sessions.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove the handle first so no new lookup can reach the session, then
    /// release it within `grace`.
    pub fn unload(&self, handle: SessionHandle, grace: Duration) -> UnloadOutcome {
        let Some((_, session)) = self.sessions.remove(&handle) else {
            return UnloadOutcome::NotFound;
        };
        match session.release(grace) {
            SessionState::Freed => UnloadOutcome::Freed,
            SessionState::Leaked => {
                tracing::error!(
                    handle = %handle,
                    grace_ms = grace.as_millis() as u64,
                    "in-flight native call outlived unload grace; session leaked"
                );
                UnloadOutcome::Leaked
            }
            SessionState::Loaded => UnloadOutcome::Freed,
        }
    }
}
