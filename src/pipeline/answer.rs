//! The answer shape every explanation path produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::FailureKind;
use crate::incident::Severity;
use crate::slots::ActionCategory;

/// Why a model attempt ended in the deterministic fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum FallbackCause {
    /// Another inference held the session. Contention, not an error.
    Busy,
    Unavailable,
    Timeout,
    /// Typed native error; carries the wire code.
    NativeError(String),
    EmptyOutput,
    PromptRejected,
    ParseFailure,
    ValidationRejected,
    RenderFailure,
    PolicyRejected,
    /// The blocking task running the pipeline failed.
    Internal,
}

impl FallbackCause {
    pub fn from_failure(kind: &FailureKind) -> Self {
        match kind {
            FailureKind::Busy => Self::Busy,
            FailureKind::NotAvailable => Self::Unavailable,
            FailureKind::Timeout => Self::Timeout,
            FailureKind::EmptyOutput => Self::EmptyOutput,
            FailureKind::Native(code) => Self::NativeError(code.as_str().to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::NativeError(_) => "native_error",
            Self::EmptyOutput => "empty_output",
            Self::PromptRejected => "prompt_rejected",
            Self::ParseFailure => "parse_failure",
            Self::ValidationRejected => "validation_rejected",
            Self::RenderFailure => "render_failure",
            Self::PolicyRejected => "policy_rejected",
            Self::Internal => "internal",
        }
    }

    /// Contention is expected under load and is not reported as an error.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NativeError(code) => write!(f, "native_error({code})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Which path produced the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "cause")]
pub enum Attribution {
    /// No model attempt was made.
    Deterministic,
    /// Built from validated model slots.
    ModelAssisted,
    /// A model attempt failed; the deterministic generator answered.
    ModelFallback(FallbackCause),
}

impl Attribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::ModelAssisted => "model_assisted",
            Self::ModelFallback(_) => "model_fallback",
        }
    }

    pub fn is_model_assisted(&self) -> bool {
        matches!(self, Self::ModelAssisted)
    }

    pub fn fallback_cause(&self) -> Option<&FallbackCause> {
        match self {
            Self::ModelFallback(cause) => Some(cause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonLine {
    pub evidence_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStep {
    pub category: ActionCategory,
    pub text: String,
}

/// A complete, user-presentable explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationAnswer {
    pub incident_id: String,
    pub severity: Severity,
    pub summary: String,
    pub reasons: Vec<ReasonLine>,
    pub actions: Vec<ActionStep>,
    pub ignore_guidance: Option<String>,
    pub confidence: f64,
    pub attribution: Attribution,
    /// Short localized notice shown when the model path fell back.
    pub notice: Option<String>,
}

impl ExplanationAnswer {
    pub fn has_action(&self, category: ActionCategory) -> bool {
        self.actions.iter().any(|a| a.category == category)
    }
}
