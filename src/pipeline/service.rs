//! Async front door for the pipeline.
//!
//! Inference blocks a thread for up to the configured timeout, so each
//! request runs on tokio's blocking pool.

use std::sync::Arc;

use super::answer::{Attribution, ExplanationAnswer, FallbackCause};
use super::orchestrator::{ExplainOutcome, ExplainRequest, ExplanationPipeline};

#[derive(Clone)]
pub struct ExplainService {
    pipeline: Arc<ExplanationPipeline>,
}

impl ExplainService {
    pub fn new(pipeline: Arc<ExplanationPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<ExplanationPipeline> {
        &self.pipeline
    }

    /// Always resolves to an answer, even if the blocking task panics.
    pub async fn explain(&self, request: ExplainRequest) -> ExplanationAnswer {
        self.explain_traced(request).await.answer
    }

    pub async fn explain_traced(&self, request: ExplainRequest) -> ExplainOutcome {
        let pipeline = Arc::clone(&self.pipeline);
        let incident = request.incident.clone();
        let locale = request.locale.unwrap_or(pipeline.config().locale);

        match tokio::task::spawn_blocking(move || pipeline.explain_traced(&request)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, incident_id = %incident.id, "explanation task failed");
                let answer = self.pipeline.deterministic_answer(
                    &incident,
                    Attribution::ModelFallback(FallbackCause::Internal),
                    locale,
                );
                ExplainOutcome { answer, trace: Default::default(), latency_ms: 0 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{Evidence, EvidenceKind, Incident, IncidentCategory, Severity};
    use crate::pipeline::PipelineConfig;

    #[tokio::test]
    async fn concurrent_requests_all_get_answers() {
        let service = ExplainService::new(Arc::new(ExplanationPipeline::new(PipelineConfig::default())));
        let incident = Incident {
            id: "inc-s".into(),
            category: IncidentCategory::NetworkThreat,
            severity: Severity::Medium,
            subject: Some("CafeWifi".into()),
            evidence: vec![Evidence {
                id: "ev-1".into(),
                kind: EvidenceKind::SuspiciousNetwork,
                severity: Severity::Medium,
                label: None,
            }],
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = service.clone();
            let req = ExplainRequest::new(incident.clone());
            handles.push(tokio::spawn(async move { svc.explain(req).await }));
        }
        for handle in handles {
            let answer = handle.await.unwrap();
            assert_eq!(answer.severity, Severity::Medium);
            assert!(!answer.actions.is_empty());
        }
    }
}
