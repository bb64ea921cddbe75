//! Explanation pipeline.
//!
//! `BuildPrompt -> Infer -> Parse -> Validate -> Render -> PolicyCheck`.
//! Any failing stage diverts to the deterministic generator, so `explain`
//! always returns an answer. Raw prompts and model output are dropped once
//! the stage that needs them is done; only digests and stage labels are kept.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::answer::{Attribution, ExplanationAnswer, FallbackCause};
use super::fallback::{DeterministicGenerator, RuleBasedGenerator};
use super::gate::{CapabilityGate, StaticGate};
use super::notice::{fallback_notice, Locale};
use super::policy::PolicyCheck;
use super::prompt::PromptBuilder;
use super::render;
use crate::engine::{EngineDiagnostics, ExecutionCore, InferenceConfig, InferenceResult, UnloadOutcome, RUNTIME_ID};
use crate::incident::Incident;
use crate::parser::decode_slots;
use crate::telemetry::{self, ExplainSpan};
use crate::validator::{SlotValidator, ValidationMode, ValidationResult};

/// Pipeline settings fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub inference: InferenceConfig,
    pub validation_mode: ValidationMode,
    pub max_prompt_bytes: usize,
    pub locale: Locale,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::for_slots(),
            validation_mode: ValidationMode::Lenient,
            max_prompt_bytes: 6144,
            locale: Locale::En,
        }
    }
}

/// One explanation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub incident: Incident,
    #[serde(default)]
    pub locale: Option<Locale>,
    /// Overrides the pipeline's configured mode for this request.
    #[serde(default)]
    pub validation_mode: Option<ValidationMode>,
}

impl ExplainRequest {
    pub fn new(incident: Incident) -> Self {
        Self { incident, locale: None, validation_mode: None }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    BuildPrompt,
    Infer,
    Parse,
    Validate,
    Render,
    PolicyCheck,
    Fallback,
}

impl PipelineStage {
    pub const MODEL_PATH: [PipelineStage; 6] = [
        Self::BuildPrompt,
        Self::Infer,
        Self::Parse,
        Self::Validate,
        Self::Render,
        Self::PolicyCheck,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildPrompt => "build_prompt",
            Self::Infer => "infer",
            Self::Parse => "parse",
            Self::Validate => "validate",
            Self::Render => "render",
            Self::PolicyCheck => "policy_check",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub passed: bool,
    /// Diagnostic label, never user-facing.
    pub detail: Option<String>,
}

/// Inference metrics carried into the trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceMetrics {
    pub total_time_ms: u64,
    pub time_to_first_token_ms: Option<u64>,
    pub tokens_generated: Option<u32>,
}

/// What happened on the way to an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTrace {
    pub stages: Vec<StageRecord>,
    pub prompt_digest: Option<String>,
    pub inference: Option<InferenceMetrics>,
    /// `valid`, `repaired` or `rejected` when validation ran.
    pub validation: Option<&'static str>,
    pub applied_fixes: usize,
    /// True when the model's slots only referenced evidence in the incident.
    pub evidence_faithful: Option<bool>,
    /// True when the payload decoded into slots.
    pub schema_compliant: Option<bool>,
    pub confidence: Option<f64>,
}

impl StageTrace {
    fn pass(&mut self, stage: PipelineStage) {
        self.stages.push(StageRecord { stage, passed: true, detail: None });
    }

    fn fail(&mut self, stage: PipelineStage, detail: impl Into<String>) {
        self.stages.push(StageRecord { stage, passed: false, detail: Some(detail.into()) });
    }

    pub fn reached(&self, stage: PipelineStage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// Answer plus trace, for the self-test harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainOutcome {
    pub answer: ExplanationAnswer,
    pub trace: StageTrace,
    pub latency_ms: u64,
}

/// Point-in-time view for callers. Carries no incident or model text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineDiagnostics {
    pub runtime_id: String,
    pub gate_open: bool,
    pub validation_mode: ValidationMode,
    pub engine: Option<EngineDiagnostics>,
}

enum ModelPathError {
    /// No model attempt was made.
    Skipped(&'static str),
    Failed { stage: PipelineStage, cause: FallbackCause },
}

fn failed(stage: PipelineStage, cause: FallbackCause) -> ModelPathError {
    ModelPathError::Failed { stage, cause }
}

pub struct ExplanationPipeline {
    engine: RwLock<Option<Arc<ExecutionCore>>>,
    gate: Arc<dyn CapabilityGate>,
    generator: Arc<dyn DeterministicGenerator>,
    validator: SlotValidator,
    prompts: PromptBuilder,
    policy: PolicyCheck,
    config: PipelineConfig,
}

impl ExplanationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            engine: RwLock::new(None),
            gate: Arc::new(StaticGate::open()),
            generator: Arc::new(RuleBasedGenerator::new()),
            validator: SlotValidator::new(),
            prompts: PromptBuilder::new(config.max_prompt_bytes),
            policy: PolicyCheck::new(),
            config,
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn CapabilityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn DeterministicGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_engine(self, engine: Arc<ExecutionCore>) -> Self {
        *self.engine.write() = Some(engine);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Model manager notification: a model is ready. Returns the outcome of
    /// unloading the engine it replaces, if any.
    pub fn attach_engine(&self, engine: Arc<ExecutionCore>) -> Option<UnloadOutcome> {
        let previous = self.engine.write().replace(engine);
        previous.map(|old| old.shutdown())
    }

    /// Model manager notification: the model is going away.
    pub fn detach_engine(&self) -> Option<UnloadOutcome> {
        let previous = self.engine.write().take();
        previous.map(|old| old.shutdown())
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        PipelineDiagnostics {
            runtime_id: RUNTIME_ID.to_string(),
            gate_open: self.gate.should_attempt_inference(),
            validation_mode: self.config.validation_mode,
            engine: self.engine.read().as_ref().map(|e| e.diagnostics()),
        }
    }

    /// Always returns an answer.
    pub fn explain(&self, request: &ExplainRequest) -> ExplanationAnswer {
        self.explain_traced(request).answer
    }

    /// Deterministic answer with policy applied, without any model attempt.
    pub fn deterministic_answer(&self, incident: &Incident, attribution: Attribution, locale: Locale) -> ExplanationAnswer {
        let mut answer = self.policy.enforce(self.generator.generate(incident));
        answer.notice = attribution.fallback_cause().map(|cause| fallback_notice(cause, locale).to_string());
        answer.attribution = attribution;
        answer
    }

    pub fn explain_traced(&self, request: &ExplainRequest) -> ExplainOutcome {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = ExplainSpan::new(&request_id, &request.incident.id);
        let _entered = span.enter();

        let mode = request.validation_mode.unwrap_or(self.config.validation_mode);
        let locale = request.locale.unwrap_or(self.config.locale);
        let mut trace = StageTrace::default();

        let path = self.model_path(&request.incident, mode, &mut trace);

        let answer = match path {
            Ok(answer) => answer,
            Err(ModelPathError::Skipped(why)) => {
                tracing::debug!(reason = why, "model path skipped; deterministic answer");
                self.deterministic_answer(&request.incident, Attribution::Deterministic, locale)
            }
            Err(ModelPathError::Failed { stage, cause }) => {
                if cause.is_contention() {
                    tracing::debug!(stage = stage.as_str(), "engine busy; falling back");
                } else {
                    tracing::warn!(stage = stage.as_str(), cause = %cause, "model path failed; falling back");
                }
                telemetry::record_fallback(cause.as_str());
                trace.pass(PipelineStage::Fallback);
                self.deterministic_answer(&request.incident, Attribution::ModelFallback(cause), locale)
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        span.finish(&answer.attribution, latency_ms);
        telemetry::record_explanation(answer.attribution.as_str(), latency_ms);

        ExplainOutcome { answer, trace, latency_ms }
    }

    fn model_path(
        &self,
        incident: &Incident,
        mode: ValidationMode,
        trace: &mut StageTrace,
    ) -> Result<ExplanationAnswer, ModelPathError> {
        if !self.gate.should_attempt_inference() {
            return Err(ModelPathError::Skipped("capability gate closed"));
        }
        let Some(engine) = self.engine.read().clone() else {
            return Err(ModelPathError::Skipped("no engine attached"));
        };

        let prompt = self.prompts.build(incident).map_err(|e| {
            trace.fail(PipelineStage::BuildPrompt, e.to_string());
            failed(PipelineStage::BuildPrompt, FallbackCause::PromptRejected)
        })?;
        trace.pass(PipelineStage::BuildPrompt);
        trace.prompt_digest = Some(prompt.digest.clone());

        // Conditions may have changed while the prompt was built.
        if !self.gate.should_attempt_inference() {
            return Err(ModelPathError::Skipped("capability gate closed before inference"));
        }

        tracing::debug!(prompt_digest = %prompt.digest, bytes = prompt.text.len(), "running inference");
        let raw_output = match engine.run_inference(&prompt.text, &self.config.inference) {
            InferenceResult::Success { raw_output, time_to_first_token_ms, total_time_ms, tokens_generated } => {
                trace.inference = Some(InferenceMetrics { total_time_ms, time_to_first_token_ms, tokens_generated });
                raw_output
            }
            InferenceResult::Failure { kind, .. } => {
                trace.fail(PipelineStage::Infer, kind.to_string());
                return Err(failed(PipelineStage::Infer, FallbackCause::from_failure(&kind)));
            }
        };
        trace.pass(PipelineStage::Infer);
        drop(prompt);

        let slots = decode_slots(&raw_output).map_err(|e| {
            trace.schema_compliant = Some(false);
            trace.fail(PipelineStage::Parse, e.kind());
            failed(PipelineStage::Parse, FallbackCause::ParseFailure)
        })?;
        drop(raw_output);
        trace.schema_compliant = Some(true);
        trace.evidence_faithful = Some(slots.reason_ids.iter().all(|id| incident.has_evidence(id.trim())));
        trace.pass(PipelineStage::Parse);

        let validation = self.validator.validate(&slots, incident, mode);
        trace.validation = Some(validation.label());
        if let ValidationResult::Repaired(_, fixes) = &validation {
            trace.applied_fixes = fixes.len();
        }
        let validated = validation.into_slots().map_err(|reason| {
            tracing::debug!(%reason, "slots rejected");
            trace.fail(PipelineStage::Validate, "rejected");
            failed(PipelineStage::Validate, FallbackCause::ValidationRejected)
        })?;
        trace.pass(PipelineStage::Validate);
        trace.confidence = Some(validated.confidence());

        let answer = render::render_slots(incident, &validated).map_err(|e| {
            trace.fail(PipelineStage::Render, e.to_string());
            failed(PipelineStage::Render, FallbackCause::RenderFailure)
        })?;
        trace.pass(PipelineStage::Render);

        let answer = self.policy.apply(answer).map_err(|e| {
            trace.fail(PipelineStage::PolicyCheck, e.to_string());
            failed(PipelineStage::PolicyCheck, FallbackCause::PolicyRejected)
        })?;
        trace.pass(PipelineStage::PolicyCheck);
        Ok(answer)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
