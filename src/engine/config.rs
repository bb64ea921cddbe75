//! Inference configuration types for the execution core.
//!
//! All fields have safe defaults. `InferenceConfig` is created once per call
//! site and never mutated; the engine derives its own `GenerationParams`
//! from it and forces greedy decoding regardless of the caller's temperature.

use std::time::Duration;

use super::error::EngineError;

/// Per-call inference configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Maximum tokens to generate.
    pub max_new_tokens: u32,
    /// Requested temperature. Advisory only: decoding is always greedy.
    pub temperature: f32,
    /// Top-p (nucleus) sampling threshold (0.0–1.0)
    pub top_p: f32,
    /// Hard timeout in milliseconds for the native call.
    pub timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 192,
            temperature: 0.0,
            top_p: 1.0,
            timeout_ms: 8_000,
        }
    }
}

impl InferenceConfig {
    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_new_tokens == 0 {
            return Err(EngineError::InvalidConfig("max_new_tokens must be > 0".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EngineError::InvalidConfig(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(EngineError::InvalidConfig("top_p must be in range (0.0, 1.0]".into()));
        }
        if self.timeout_ms == 0 {
            return Err(EngineError::InvalidConfig("timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Config for slot generation: short output, tight deadline.
    pub fn for_slots() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parameters the native backend actually decodes with.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub top_p: f32,
    pub timeout: Duration,
}

impl GenerationParams {
    /// Derive backend parameters, clamping anything out of range.
    pub fn from_config(config: &InferenceConfig) -> Self {
        let top_p = if config.top_p > 0.0 && config.top_p <= 1.0 { config.top_p } else { 1.0 };
        Self {
            max_new_tokens: config.max_new_tokens.max(1),
            top_p,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
        }
    }
}

/// Fixed timing constants for waiting, cancelling and unloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTuning {
    /// Added to the call timeout before the waiting side gives up.
    pub wait_grace: Duration,
    /// Time the native loop gets to observe cancel before the lock is released.
    pub cancel_cooldown: Duration,
    /// Upper bound an unload waits for the in-flight call before leaking.
    pub unload_grace: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            wait_grace: Duration::from_millis(250),
            cancel_cooldown: Duration::from_millis(150),
            unload_grace: Duration::from_millis(300),
        }
    }
}

impl EngineTuning {
    /// Worst-case wall time of one `run_inference` call for a given timeout.
    pub fn worst_case(&self, timeout: Duration) -> Duration {
        timeout + self.wait_grace + self.cancel_cooldown
    }
}
