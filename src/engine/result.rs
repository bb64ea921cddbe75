//! Outcome of one `run_inference` call.

use serde::{Deserialize, Serialize};

use super::error::FailureKind;

/// Per-call outcome. Optional metrics mean "unknown", which is not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InferenceResult {
    Success {
        /// Payload text with the metrics prefix removed.
        raw_output: String,
        time_to_first_token_ms: Option<u64>,
        total_time_ms: u64,
        tokens_generated: Option<u32>,
    },
    Failure {
        kind: FailureKind,
        message: String,
        elapsed_ms: u64,
    },
}

impl InferenceResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Failure { kind, message: message.into(), elapsed_ms }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            Self::Failure { kind, .. } => Some(kind),
            Self::Success { .. } => None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            Self::Success { total_time_ms, .. } => *total_time_ms,
            Self::Failure { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    /// Metrics label: `success` or the failure kind.
    pub fn label(&self) -> &str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { kind, .. } => kind.as_str(),
        }
    }
}
