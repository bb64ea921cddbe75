//! Failure taxonomy for the execution core.
//!
//! Runtime failures never surface as `Err` from `run_inference`; they are
//! folded into `InferenceResult::Failure` with a `FailureKind`. `EngineError`
//! is reserved for construction-time problems (loading, worker spawn).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed error code reported by the native session.
///
/// Codes are opaque to the execution core: they are passed through for
/// diagnostics and only the poisoning codes change engine state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeErrorCode {
    NullHandle,
    StaleHandle,
    Poisoned,
    NullContext,
    Tokenize,
    ContextOverflow,
    Decode,
    Cancelled,
    Timeout,
    Other(String),
}

impl NativeErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NullHandle => "NULL_HANDLE",
            Self::StaleHandle => "STALE_HANDLE",
            Self::Poisoned => "POISONED",
            Self::NullContext => "NULL_CTX",
            Self::Tokenize => "TOKENIZE",
            Self::ContextOverflow => "CTX_OVERFLOW",
            Self::Decode => "DECODE",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Other(code) => code.as_str(),
        }
    }

    /// Map a wire code back to a typed code. Unknown codes are kept verbatim.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NULL_HANDLE" => Self::NullHandle,
            "STALE_HANDLE" => Self::StaleHandle,
            "POISONED" => Self::Poisoned,
            "NULL_CTX" => Self::NullContext,
            "TOKENIZE" => Self::Tokenize,
            "CTX_OVERFLOW" => Self::ContextOverflow,
            "DECODE" => Self::Decode,
            "CANCELLED" => Self::Cancelled,
            "TIMEOUT" => Self::Timeout,
            "" => Self::Other("UNKNOWN".to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    /// Codes meaning the session behind the handle is gone for good.
    pub fn is_poisoning(&self) -> bool {
        matches!(self, Self::NullHandle | Self::StaleHandle | Self::Poisoned | Self::NullContext)
    }
}

impl fmt::Display for NativeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported from inside a native backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct NativeError {
    pub code: NativeErrorCode,
    pub message: String,
}

impl NativeError {
    pub fn new(code: NativeErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Encode as the `ERR|CODE|message` wire tag.
    pub fn to_wire(&self) -> String {
        format!("ERR|{}|{}", self.code.as_str(), self.message)
    }
}

/// Why an inference call did not produce usable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No session loaded, or the platform cannot run one.
    NotAvailable,
    /// Single-flight contention. Retryable, not an error.
    Busy,
    /// The deadline elapsed before the native call returned.
    Timeout,
    /// The native call returned no payload text.
    EmptyOutput,
    /// The native session reported a typed error.
    Native(NativeErrorCode),
}

impl FailureKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotAvailable => "not_available",
            Self::Busy => "busy",
            Self::Timeout => "timeout",
            Self::EmptyOutput => "empty_output",
            Self::Native(_) => "native_error",
        }
    }

    /// True when a later retry may succeed without any state change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout)
    }

    /// True when the failure should be logged as a warning or worse.
    pub fn is_alarming(&self) -> bool {
        !matches!(self, Self::Busy | Self::NotAvailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(code) => write!(f, "native_error({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors raised while bringing an engine up.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Session registry exhausted: generation or slot counter wrapped")]
    RegistryExhausted,

    #[error("Worker spawn failed: {0}")]
    WorkerSpawn(String),

    #[error("Invalid inference config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip() {
        for code in [
            NativeErrorCode::StaleHandle,
            NativeErrorCode::Poisoned,
            NativeErrorCode::Tokenize,
            NativeErrorCode::ContextOverflow,
            NativeErrorCode::Decode,
        ] {
            assert_eq!(NativeErrorCode::from_wire(code.as_str()), code);
        }
        assert_eq!(
            NativeErrorCode::from_wire("GPU_LOST"),
            NativeErrorCode::Other("GPU_LOST".into())
        );
    }

    #[test]
    fn busy_is_retryable_and_quiet() {
        assert!(FailureKind::Busy.is_retryable());
        assert!(!FailureKind::Busy.is_alarming());
        assert!(FailureKind::Timeout.is_alarming());
    }

    #[test]
    fn native_error_wire_format() {
        let err = NativeError::new(NativeErrorCode::ContextOverflow, "prompt exceeds context window");
        assert_eq!(err.to_wire(), "ERR|CTX_OVERFLOW|prompt exceeds context window");
    }
}
