//! End-to-end explanation tests through the public API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sentinel_core::engine::{EngineTuning, ExecutionCore, ReplayBackend, ReplayStep};
use sentinel_core::parser::ParserLimits;
use sentinel_core::pipeline::{
    Attribution, ExplainRequest, ExplainService, ExplanationPipeline, FallbackCause, Locale, PipelineConfig,
    PipelineStage,
};
use sentinel_core::slots::ActionCategory;
use sentinel_core::{Evidence, EvidenceKind, ExplainConfig, Incident, IncidentCategory, Severity};

const GOOD: &str = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1"],"action_categories":["REVIEW_PERMISSIONS","UNINSTALL_APP"],"confidence":0.8}"#;
const ESCALATION: &str = r#"{"assessed_severity":"CRITICAL","reason_ids":["ev-1"],"action_categories":["FACTORY_RESET"],"confidence":0.9}"#;

fn incident(evidence_severity: Severity) -> Incident {
    Incident {
        id: "inc-e2e".into(),
        category: IncidentCategory::SuspiciousApp,
        severity: Severity::High,
        subject: Some("FlashTorch".into()),
        evidence: vec![Evidence {
            id: "ev-1".into(),
            kind: EvidenceKind::DeviceAdmin,
            severity: evidence_severity,
            label: Some("FlashTorch".into()),
        }],
    }
}

fn engine(backend: ReplayBackend) -> Arc<ExecutionCore> {
    Arc::new(ExecutionCore::new(Box::new(backend), EngineTuning::default(), ParserLimits::default()).unwrap())
}

fn pipeline(backend: ReplayBackend) -> ExplanationPipeline {
    ExplanationPipeline::new(PipelineConfig::default()).with_engine(engine(backend))
}

#[test]
fn test_escalation_to_factory_reset_falls_back() {
    let pipeline = pipeline(ReplayBackend::constant(ESCALATION));
    let outcome = pipeline.explain_traced(&ExplainRequest::new(incident(Severity::Medium)));

    assert_eq!(
        outcome.answer.attribution,
        Attribution::ModelFallback(FallbackCause::ValidationRejected)
    );
    assert_eq!(outcome.answer.severity, Severity::High);
    assert!(!outcome.answer.has_action(ActionCategory::FactoryReset));
    assert!(!outcome.answer.actions.is_empty());
    assert_eq!(outcome.trace.validation, Some("rejected"));
    assert!(outcome.trace.reached(PipelineStage::Render).is_none());
}

#[test]
fn test_factory_reset_on_high_incident_is_rejected_by_validator() {
    // One level above HIGH evidence is a supported escalation, but the
    // action itself is out of proportion for a HIGH incident.
    let with_harmless_action = r#"{"assessed_severity":"CRITICAL","reason_ids":["ev-1"],"action_categories":["FACTORY_RESET","REVIEW_PERMISSIONS"],"confidence":0.9}"#;
    for claim in [ESCALATION, with_harmless_action] {
        let pipeline = pipeline(ReplayBackend::constant(claim));
        for mode in [sentinel_core::ValidationMode::Lenient, sentinel_core::ValidationMode::Strict] {
            let outcome = pipeline.explain_traced(&ExplainRequest::new(incident(Severity::High)).with_mode(mode));
            assert_eq!(outcome.trace.validation, Some("rejected"), "{mode}: {claim}");
            assert_eq!(
                outcome.answer.attribution,
                Attribution::ModelFallback(FallbackCause::ValidationRejected),
                "{mode}: {claim}"
            );
            assert_eq!(outcome.answer.severity, Severity::High);
            assert!(!outcome.answer.has_action(ActionCategory::FactoryReset));
        }
    }
}

#[test]
fn test_second_simultaneous_request_is_busy_fallback() {
    // About 30 tokens at 20 ms: the first request holds the engine ~600 ms.
    let backend = ReplayBackend::constant(GOOD).with_token_delay(Duration::from_millis(20));
    let probes = backend.probes();
    let pipeline = Arc::new(pipeline(backend));

    let first = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || pipeline.explain(&ExplainRequest::new(incident(Severity::Medium))))
    };
    while !probes.is_active() {
        thread::sleep(Duration::from_millis(2));
    }

    let second = pipeline.explain(&ExplainRequest::new(incident(Severity::Medium)));
    assert_eq!(second.attribution, Attribution::ModelFallback(FallbackCause::Busy));
    assert!(second.attribution.fallback_cause().is_some_and(|c| c.is_contention()));
    assert_eq!(second.severity, Severity::High);

    assert_eq!(first.join().unwrap().attribution, Attribution::ModelAssisted);
    assert_eq!(probes.max_concurrent(), 1);
}

#[test]
fn test_timeout_falls_back_and_next_request_uses_model() {
    let backend = ReplayBackend::sequence(vec![
        ReplayStep::Hang(Duration::from_millis(500)),
        ReplayStep::Respond(GOOD.into()),
    ]);
    let tuning = EngineTuning {
        wait_grace: Duration::from_millis(20),
        cancel_cooldown: Duration::from_millis(20),
        unload_grace: Duration::from_millis(100),
    };
    let core = Arc::new(ExecutionCore::new(Box::new(backend), tuning, ParserLimits::default()).unwrap());
    let mut config = PipelineConfig::default();
    config.inference.timeout_ms = 100;
    let pipeline = ExplanationPipeline::new(config).with_engine(core);

    let first = pipeline.explain(&ExplainRequest::new(incident(Severity::Medium)));
    assert_eq!(first.attribution, Attribution::ModelFallback(FallbackCause::Timeout));

    // The hung call still owns the session until it returns.
    thread::sleep(Duration::from_millis(600));
    let second = pipeline.explain(&ExplainRequest::new(incident(Severity::Medium)));
    assert_eq!(second.attribution, Attribution::ModelAssisted);
}

#[test]
fn test_fallback_notice_never_leaks_native_text() {
    let secret = "llama_decode: KV slot 17 corrupted at 0xdeadbeef";
    let pipeline = pipeline(ReplayBackend::sequence(vec![ReplayStep::Fail(
        sentinel_core::engine::NativeErrorCode::Decode,
        secret.into(),
    )]));
    for locale in [Locale::En, Locale::De] {
        let answer = pipeline.explain(&ExplainRequest::new(incident(Severity::Medium)).with_locale(locale));
        let json = serde_json::to_string(&answer).unwrap();
        assert!(!json.contains("0xdeadbeef"));
        assert!(answer.notice.is_some());
    }
}

#[test]
fn test_toml_config_drives_pipeline_mode() {
    let config = ExplainConfig::from_toml_str("[pipeline]\nvalidation_mode = \"strict\"\nlocale = \"de\"\n").unwrap();
    let repairable = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1","ev-404"],"action_categories":["REVIEW_PERMISSIONS"],"confidence":0.6}"#;
    let pipeline = ExplanationPipeline::new(config.pipeline_config())
        .with_engine(engine(ReplayBackend::constant(repairable)));

    let answer = pipeline.explain(&ExplainRequest::new(incident(Severity::Medium)));
    assert_eq!(answer.attribution, Attribution::ModelFallback(FallbackCause::ValidationRejected));
    assert!(answer.notice.is_some_and(|n| n.contains("Standardregeln")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_under_contention_answers_every_request() {
    let backend = ReplayBackend::constant(GOOD).with_token_delay(Duration::from_millis(5));
    let probes = backend.probes();
    let service = ExplainService::new(Arc::new(pipeline(backend)));

    let mut handles = Vec::new();
    for _ in 0..12 {
        let svc = service.clone();
        let req = ExplainRequest::new(incident(Severity::Medium));
        handles.push(tokio::spawn(async move { svc.explain(req).await }));
    }

    let mut assisted = 0;
    for handle in handles {
        let answer = handle.await.unwrap();
        assert_eq!(answer.incident_id, "inc-e2e");
        match answer.attribution {
            Attribution::ModelAssisted => assisted += 1,
            Attribution::ModelFallback(FallbackCause::Busy) => {}
            other => panic!("unexpected attribution {other:?}"),
        }
    }
    assert!(assisted >= 1);
    assert_eq!(probes.max_concurrent(), 1);
}
