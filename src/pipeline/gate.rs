//! Capability gate: decides whether a model attempt is allowed at all.
//!
//! The host wires in battery, thermal and user-setting checks. The pipeline
//! asks at the start of `explain` and again right before inference.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait CapabilityGate: Send + Sync {
    fn should_attempt_inference(&self) -> bool;
}

impl<F> CapabilityGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn should_attempt_inference(&self) -> bool {
        self()
    }
}

/// Gate backed by a flag the host flips.
#[derive(Debug)]
pub struct StaticGate(AtomicBool);

impl StaticGate {
    pub fn new(open: bool) -> Self {
        Self(AtomicBool::new(open))
    }

    pub fn open() -> Self {
        Self::new(true)
    }

    pub fn closed() -> Self {
        Self::new(false)
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::Release);
    }
}

impl Default for StaticGate {
    fn default() -> Self {
        Self::open()
    }
}

impl CapabilityGate for StaticGate {
    fn should_attempt_inference(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
