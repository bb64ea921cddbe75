//! Tests for the explanation pipeline.

use super::*;
use crate::engine::{EngineTuning, ReplayBackend, ReplayStep, NativeErrorCode};
use crate::incident::{Evidence, EvidenceKind, IncidentCategory, Severity};
use crate::parser::ParserLimits;
use crate::slots::ActionCategory;

fn high_incident() -> Incident {
    Incident {
        id: "inc-high".into(),
        category: IncidentCategory::SuspiciousApp,
        severity: Severity::High,
        subject: Some("QuickCleaner".into()),
        evidence: vec![
            Evidence {
                id: "ev-1".into(),
                kind: EvidenceKind::AccessibilityService,
                severity: Severity::Medium,
                label: None,
            },
            Evidence {
                id: "ev-2".into(),
                kind: EvidenceKind::UnknownInstallSource,
                severity: Severity::Medium,
                label: None,
            },
        ],
    }
}

fn engine(backend: ReplayBackend) -> Arc<ExecutionCore> {
    Arc::new(ExecutionCore::new(Box::new(backend), EngineTuning::default(), ParserLimits::default()).unwrap())
}

fn pipeline_with(backend: ReplayBackend) -> ExplanationPipeline {
    ExplanationPipeline::new(PipelineConfig::default()).with_engine(engine(backend))
}

const GOOD: &str = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1","ev-2"],"action_categories":["REVIEW_PERMISSIONS","UNINSTALL_APP"],"confidence":0.82}"#;

#[test]
fn without_engine_answer_is_deterministic() {
    let pipeline = ExplanationPipeline::new(PipelineConfig::default());
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::Deterministic);
    assert!(answer.notice.is_none());
    assert_eq!(answer.severity, Severity::High);
}

#[test]
fn closed_gate_skips_inference() {
    let backend = ReplayBackend::constant(GOOD);
    let probes = backend.probes();
    let pipeline = pipeline_with(backend).with_gate(Arc::new(StaticGate::closed()));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::Deterministic);
    assert_eq!(probes.calls(), 0);
}

#[test]
fn valid_model_output_is_model_assisted() {
    let pipeline = pipeline_with(ReplayBackend::constant(GOOD));
    let outcome = pipeline.explain_traced(&ExplainRequest::new(high_incident()));
    assert_eq!(outcome.answer.attribution, Attribution::ModelAssisted);
    assert_eq!(outcome.answer.reasons.len(), 2);
    assert!(outcome.answer.has_action(ActionCategory::UninstallApp));
    assert!((outcome.answer.confidence - 0.82).abs() < 1e-9);
    for stage in PipelineStage::MODEL_PATH {
        assert!(outcome.trace.reached(stage).map(|r| r.passed).unwrap_or(false), "{stage:?}");
    }
    assert_eq!(outcome.trace.validation, Some("valid"));
    assert_eq!(outcome.trace.prompt_digest.as_ref().map(String::len), Some(16));
}

#[test]
fn unsupported_escalation_falls_back_to_incident_severity() {
    let claim = r#"{"assessed_severity":"CRITICAL","reason_ids":["ev-1"],"action_categories":["FACTORY_RESET"],"confidence":0.95}"#;
    let pipeline = pipeline_with(ReplayBackend::constant(claim));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::ModelFallback(FallbackCause::ValidationRejected));
    assert_eq!(answer.severity, Severity::High);
    assert!(!answer.has_action(ActionCategory::FactoryReset));
    assert!(answer.notice.is_some());
}

#[test]
fn unparseable_output_falls_back() {
    let pipeline = pipeline_with(ReplayBackend::constant("I think this app is dangerous."));
    let outcome = pipeline.explain_traced(&ExplainRequest::new(high_incident()));
    assert_eq!(outcome.answer.attribution, Attribution::ModelFallback(FallbackCause::ParseFailure));
    assert_eq!(outcome.trace.schema_compliant, Some(false));
    assert!(outcome.trace.reached(PipelineStage::Fallback).is_some());
}

#[test]
fn native_error_code_is_carried_in_attribution() {
    let pipeline = pipeline_with(ReplayBackend::sequence(vec![ReplayStep::Fail(
        NativeErrorCode::Decode,
        "llama_decode returned 1".into(),
    )]));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(
        answer.attribution,
        Attribution::ModelFallback(FallbackCause::NativeError("DECODE".into()))
    );
}

#[test]
fn model_answer_without_actions_fails_policy() {
    let empty = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1"],"action_categories":[],"confidence":0.5}"#;
    let pipeline = pipeline_with(ReplayBackend::constant(empty));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::ModelFallback(FallbackCause::PolicyRejected));
    assert!(!answer.actions.is_empty());
}

#[test]
fn strict_request_overrides_lenient_pipeline() {
    let repairable = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1","ev-99"],"action_categories":["REVIEW_PERMISSIONS"],"confidence":0.7}"#;
    let pipeline = pipeline_with(ReplayBackend::constant(repairable));
    let lenient = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(lenient.attribution, Attribution::ModelAssisted);
    let strict = pipeline.explain(&ExplainRequest::new(high_incident()).with_mode(ValidationMode::Strict));
    assert_eq!(strict.attribution, Attribution::ModelFallback(FallbackCause::ValidationRejected));
}

#[test]
fn german_notice_on_fallback() {
    let pipeline = pipeline_with(ReplayBackend::constant("nope"));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()).with_locale(Locale::De));
    assert!(answer.notice.unwrap().contains("Standardregeln"));
}

#[test]
fn detach_unloads_and_returns_to_deterministic() {
    let backend = ReplayBackend::constant(GOOD);
    let probes = backend.probes();
    let pipeline = pipeline_with(backend);
    assert_eq!(pipeline.detach_engine(), Some(UnloadOutcome::Freed));
    assert!(probes.released());
    assert_eq!(pipeline.detach_engine(), None);
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::Deterministic);
    assert!(pipeline.diagnostics().engine.is_none());
}

#[test]
fn attach_replaces_and_unloads_previous_engine() {
    let first = ReplayBackend::constant(GOOD);
    let first_probes = first.probes();
    let pipeline = pipeline_with(first);
    let outcome = pipeline.attach_engine(engine(ReplayBackend::constant(GOOD)));
    assert_eq!(outcome, Some(UnloadOutcome::Freed));
    assert!(first_probes.released());
    let diag = pipeline.diagnostics();
    assert_eq!(diag.engine.map(|e| e.available), Some(true));
}

#[test]
fn closure_gate_is_consulted() {
    let pipeline = pipeline_with(ReplayBackend::constant(GOOD)).with_gate(Arc::new(|| false));
    assert!(!pipeline.diagnostics().gate_open);
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::Deterministic);
}

#[test]
fn gate_is_checked_again_right_before_inference() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let backend = ReplayBackend::constant(GOOD);
    let probes = backend.probes();
    let asked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&asked);
    // Open at request start, closed by the time the prompt is built.
    let gate = move || counter.fetch_add(1, Ordering::SeqCst) == 0;
    let pipeline = pipeline_with(backend).with_gate(Arc::new(gate));

    let outcome = pipeline.explain_traced(&ExplainRequest::new(high_incident()));
    assert_eq!(outcome.answer.attribution, Attribution::Deterministic);
    assert!(outcome.trace.reached(PipelineStage::BuildPrompt).is_some());
    assert_eq!(asked.load(Ordering::SeqCst), 2);
    assert_eq!(probes.calls(), 0);
}

#[test]
fn host_can_reopen_static_gate() {
    let gate = Arc::new(StaticGate::closed());
    let pipeline = pipeline_with(ReplayBackend::constant(GOOD)).with_gate(gate.clone());
    assert_eq!(pipeline.explain(&ExplainRequest::new(high_incident())).attribution, Attribution::Deterministic);

    gate.set_open(true);
    assert_eq!(pipeline.explain(&ExplainRequest::new(high_incident())).attribution, Attribution::ModelAssisted);
}

#[test]
fn injected_generator_answers_fallbacks() {
    struct Minimal;
    impl DeterministicGenerator for Minimal {
        fn generate(&self, incident: &Incident) -> ExplanationAnswer {
            let mut answer = crate::pipeline::minimal_answer(incident);
            answer.summary = "host summary".into();
            answer
        }
    }

    let pipeline = pipeline_with(ReplayBackend::constant("not json at all")).with_generator(Arc::new(Minimal));
    let answer = pipeline.explain(&ExplainRequest::new(high_incident()));
    assert_eq!(answer.attribution, Attribution::ModelFallback(FallbackCause::ParseFailure));
    assert_eq!(answer.summary, "host summary");
    assert!(!answer.actions.is_empty());
}
