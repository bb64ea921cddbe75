//! Self-test harness.
//!
//! Drives the pipeline repeatedly over fixture incidents and aggregates
//! latency, stability and quality figures. Runs in strict validation mode so
//! repairs that lenient mode would hide show up as rejections.

pub mod fixtures;
mod report;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::engine::{EngineError, EngineTuning, ExecutionCore, RUNTIME_ID};
use crate::parser::ParserLimits;
use crate::pipeline::{ExplainRequest, ExplanationPipeline, PipelineConfig};
use crate::validator::ValidationMode;

pub use fixtures::Fixture;
pub use report::{LatencyStats, QualityStats, SelfTestReport, StabilityStats, StagePassRate};

pub const DEFAULT_SEED: u64 = 0x5E17_1E1;

pub struct SelfTestHarness {
    pipeline: Arc<ExplanationPipeline>,
    fixtures: Vec<Fixture>,
    seed: u64,
}

impl SelfTestHarness {
    pub fn new(pipeline: Arc<ExplanationPipeline>, fixtures: Vec<Fixture>) -> Self {
        Self { pipeline, fixtures, seed: DEFAULT_SEED }
    }

    /// Harness over the built-in fixtures, answered by their recorded output.
    pub fn with_replay(config: PipelineConfig) -> Result<Self, EngineError> {
        let fixtures = fixtures::builtin();
        let backend = fixtures::replay_backend(&fixtures);
        let engine = ExecutionCore::new(Box::new(backend), EngineTuning::default(), ParserLimits::default())?;
        let pipeline = ExplanationPipeline::new(config).with_engine(Arc::new(engine));
        Ok(Self::new(Arc::new(pipeline), fixtures))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn pipeline(&self) -> &Arc<ExplanationPipeline> {
        &self.pipeline
    }

    /// Run `runs` explanations. Fixtures are visited in a shuffled order
    /// that is reshuffled after every full pass.
    pub fn run(&self, runs: usize) -> SelfTestReport {
        let mut builder = report::ReportBuilder::new();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..self.fixtures.len()).collect();

        if !self.fixtures.is_empty() {
            for i in 0..runs {
                let pos = i % order.len();
                if pos == 0 {
                    order.shuffle(&mut rng);
                }
                let fixture = &self.fixtures[order[pos]];
                let request = ExplainRequest::new(fixture.incident.clone()).with_mode(ValidationMode::Strict);
                let outcome = self.pipeline.explain_traced(&request);
                tracing::debug!(
                    fixture = fixture.name,
                    attribution = outcome.answer.attribution.as_str(),
                    latency_ms = outcome.latency_ms,
                    "self-test run"
                );
                builder.record(&outcome);
            }
        }

        let diagnostics = self.pipeline.diagnostics();
        let report = builder.finish(
            RUNTIME_ID.to_string(),
            diagnostics.engine.map(|e| e.engine_id),
            ValidationMode::Strict,
            self.seed,
        );
        tracing::info!(
            runs = report.runs,
            model_assisted = report.quality.model_assisted,
            fallback = report.quality.fallback,
            "self-test complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pass_covers_each_fixture_once() {
        let harness = SelfTestHarness::with_replay(PipelineConfig::default()).unwrap();
        let report = harness.run(7);
        assert_eq!(report.runs, 7);
        // overlay, root, background pass; escalation and hallucination are
        // rejected; prose fails to parse; decode error never reaches parsing.
        assert_eq!(report.quality.model_assisted, 3);
        assert_eq!(report.quality.fallback, 4);
        assert_eq!(report.quality.valid, 3);
        assert_eq!(report.quality.rejected, 2);
        assert_eq!(report.stability.inference_success, 6);
        assert_eq!(report.stability.structured_error, 1);
        assert!((report.quality.schema_compliance_rate - 5.0 / 6.0).abs() < 1e-9);
        assert!((report.quality.evidence_faithfulness_rate - 4.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn same_seed_gives_same_counts() {
        let a = SelfTestHarness::with_replay(PipelineConfig::default()).unwrap().with_seed(3).run(10);
        let b = SelfTestHarness::with_replay(PipelineConfig::default()).unwrap().with_seed(3).run(10);
        assert_eq!(a.stability, b.stability);
        assert_eq!(a.quality.valid, b.quality.valid);
    }

    #[test]
    fn zero_runs_produce_empty_report() {
        let report = SelfTestHarness::with_replay(PipelineConfig::default()).unwrap().run(0);
        assert_eq!(report.runs, 0);
        assert_eq!(report.latency, LatencyStats::default());
        assert!(report.stages.iter().all(|s| s.attempted == 0));
    }
}
