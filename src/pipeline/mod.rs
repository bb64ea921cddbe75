//! Incident explanation pipeline.
//!
//! Turns an [`Incident`](crate::incident::Incident) into an
//! [`ExplanationAnswer`], using the on-device model when it is available and
//! healthy and the rule-based generator otherwise.

pub mod answer;
pub mod fallback;
pub mod fragments;
pub mod gate;
pub mod notice;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod render;
pub mod service;

pub use answer::{ActionStep, Attribution, ExplanationAnswer, FallbackCause, ReasonLine};
pub use fallback::{minimal_answer, DeterministicGenerator, RuleBasedGenerator};
pub use gate::{CapabilityGate, StaticGate};
pub use notice::{fallback_notice, Locale};
pub use orchestrator::{
    ExplainOutcome, ExplainRequest, ExplanationPipeline, InferenceMetrics, PipelineConfig, PipelineDiagnostics,
    PipelineStage, StageRecord, StageTrace,
};
pub use policy::{PolicyCheck, PolicyViolation};
pub use prompt::{prompt_digest, BuiltPrompt, PromptBuilder, PromptError};
pub use render::{render_slots, RenderError};
pub use service::ExplainService;
