//! Sentinel CORE Runtime
//!
//! On-device incident explanation. A small local model fills a structured
//! slot schema for a security incident; the slots are parsed, validated
//! against the incident's own evidence, rendered from pre-authored text and
//! policy-checked. Whenever any of that fails, a deterministic rule-based
//! answer is returned instead, so callers always get an explanation.
//!
//! # Design Principles
//!
//! - **Contained**: the model only selects ids and categories; it never writes
//!   user-visible text
//! - **Offline**: no network access, no model downloads
//! - **Bounded**: one inference at a time, hard deadline, cooperative cancel
//! - **Total**: `explain` never fails and never panics on model output
//!
//! # Layout
//!
//! - [`engine`]: single-flight execution core, generation-tagged registry,
//!   native backends (llama.cpp behind the `gguf` feature, replay for tests)
//! - [`parser`]: native wire format and slot payload decoding
//! - [`validator`]: lenient and strict slot validation
//! - [`pipeline`]: the orchestrator and its deterministic fallback
//! - [`selftest`]: repeatable quality and stability benchmark

pub mod cli;
pub mod config;
pub mod engine;
pub mod incident;
pub mod parser;
pub mod pipeline;
pub mod selftest;
pub mod slots;
pub mod telemetry;
pub mod validator;

pub use config::{ConfigError, ExplainConfig};
pub use engine::{ExecutionCore, InferenceConfig, InferenceResult};
pub use incident::{Evidence, EvidenceKind, Incident, IncidentCategory, Severity};
pub use pipeline::{
    Attribution, ExplainRequest, ExplainService, ExplanationAnswer, ExplanationPipeline, FallbackCause, PipelineConfig,
};
pub use validator::{SlotValidator, ValidationMode, ValidationResult};
