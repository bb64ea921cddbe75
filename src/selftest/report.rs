//! Aggregated self-test results.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::{ExplainOutcome, FallbackCause, PipelineStage};
use crate::validator::ValidationMode;

/// Distribution of a set of millisecond samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();
        Self {
            samples: sorted.len(),
            avg_ms: sum as f64 / sorted.len() as f64,
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            median_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }
}

/// Nearest-rank percentile over sorted, non-empty samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StabilityStats {
    pub inference_success: usize,
    pub timeout: usize,
    pub structured_error: usize,
    /// Native calls that succeeded but produced only whitespace.
    pub empty_output: usize,
    pub busy: usize,
    pub unavailable: usize,
    /// Runs where no inference was attempted.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityStats {
    /// Share of decoded payloads that matched the slot schema.
    pub schema_compliance_rate: f64,
    /// Share of schema-compliant slot sets citing only known evidence.
    pub evidence_faithfulness_rate: f64,
    pub valid: usize,
    pub repaired: usize,
    pub rejected: usize,
    pub avg_confidence: Option<f64>,
    pub model_assisted: usize,
    pub fallback: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePassRate {
    pub stage: PipelineStage,
    pub attempted: usize,
    pub passed: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfTestReport {
    pub generated_at: DateTime<Utc>,
    pub runtime_id: String,
    pub engine_id: Option<String>,
    pub validation_mode: ValidationMode,
    pub runs: usize,
    pub seed: u64,
    /// End-to-end `explain` latency.
    pub latency: LatencyStats,
    /// Native call latency, successful inferences only.
    pub inference_latency: LatencyStats,
    pub tokens_per_second: Option<f64>,
    pub stability: StabilityStats,
    pub quality: QualityStats,
    pub stages: Vec<StagePassRate>,
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Folds outcomes into a report.
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    latencies: Vec<u64>,
    inference_latencies: Vec<u64>,
    tokens: u64,
    token_time_ms: u64,
    stability: StabilityStats,
    quality: QualityStats,
    schema_checked: usize,
    schema_ok: usize,
    faithful: usize,
    confidences: Vec<f64>,
    stage_counts: Vec<(PipelineStage, usize, usize)>,
}

impl ReportBuilder {
    pub(crate) fn new() -> Self {
        Self {
            stage_counts: PipelineStage::MODEL_PATH.iter().map(|s| (*s, 0, 0)).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: &ExplainOutcome) {
        let trace = &outcome.trace;
        self.latencies.push(outcome.latency_ms);

        match (&trace.inference, outcome.answer.attribution.fallback_cause()) {
            (Some(metrics), _) => {
                self.stability.inference_success += 1;
                self.inference_latencies.push(metrics.total_time_ms);
                if let Some(tokens) = metrics.tokens_generated {
                    self.tokens += u64::from(tokens);
                    self.token_time_ms += metrics.total_time_ms;
                }
            }
            (None, Some(FallbackCause::Timeout)) => self.stability.timeout += 1,
            (None, Some(FallbackCause::Busy)) => self.stability.busy += 1,
            (None, Some(FallbackCause::Unavailable)) => self.stability.unavailable += 1,
            (None, Some(FallbackCause::NativeError(_))) => self.stability.structured_error += 1,
            (None, Some(FallbackCause::EmptyOutput)) => self.stability.empty_output += 1,
            (None, _) => self.stability.skipped += 1,
        }

        if let Some(ok) = trace.schema_compliant {
            self.schema_checked += 1;
            if ok {
                self.schema_ok += 1;
                if trace.evidence_faithful == Some(true) {
                    self.faithful += 1;
                }
            }
        }
        match trace.validation {
            Some("valid") => self.quality.valid += 1,
            Some("repaired") => self.quality.repaired += 1,
            Some("rejected") => self.quality.rejected += 1,
            _ => {}
        }
        if let Some(c) = trace.confidence {
            self.confidences.push(c);
        }
        if outcome.answer.attribution.is_model_assisted() {
            self.quality.model_assisted += 1;
        } else if outcome.answer.attribution.fallback_cause().is_some() {
            self.quality.fallback += 1;
        }

        for (stage, attempted, passed) in &mut self.stage_counts {
            if let Some(record) = trace.reached(*stage) {
                *attempted += 1;
                if record.passed {
                    *passed += 1;
                }
            }
        }
    }

    pub(crate) fn finish(
        mut self,
        runtime_id: String,
        engine_id: Option<String>,
        validation_mode: ValidationMode,
        seed: u64,
    ) -> SelfTestReport {
        self.quality.schema_compliance_rate = rate(self.schema_ok, self.schema_checked);
        self.quality.evidence_faithfulness_rate = rate(self.faithful, self.schema_ok);
        self.quality.avg_confidence = (!self.confidences.is_empty())
            .then(|| self.confidences.iter().sum::<f64>() / self.confidences.len() as f64);

        let tokens_per_second = (self.token_time_ms > 0)
            .then(|| self.tokens as f64 * 1000.0 / self.token_time_ms as f64);

        SelfTestReport {
            generated_at: Utc::now(),
            runtime_id,
            engine_id,
            validation_mode,
            runs: self.latencies.len(),
            seed,
            latency: LatencyStats::from_samples(&self.latencies),
            inference_latency: LatencyStats::from_samples(&self.inference_latencies),
            tokens_per_second,
            stability: self.stability,
            quality: self.quality,
            stages: self
                .stage_counts
                .into_iter()
                .map(|(stage, attempted, passed)| StagePassRate {
                    stage,
                    attempted,
                    passed,
                    rate: rate(passed, attempted),
                })
                .collect(),
        }
    }
}

impl SelfTestReport {
    /// Plain-text rendering for the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Sentinel CORE self-test ({})", self.runtime_id);
        let _ = writeln!(out, "  generated:  {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "  engine:     {}", self.engine_id.as_deref().unwrap_or("none"));
        let _ = writeln!(out, "  mode:       {}", self.validation_mode);
        let _ = writeln!(out, "  runs:       {} (seed {})", self.runs, self.seed);

        let l = &self.latency;
        let _ = writeln!(out, "\nLatency (end to end)");
        let _ = writeln!(
            out,
            "  avg {:.1} ms  min {}  max {}  median {}  p95 {}  p99 {}",
            l.avg_ms, l.min_ms, l.max_ms, l.median_ms, l.p95_ms, l.p99_ms
        );
        if let Some(tps) = self.tokens_per_second {
            let _ = writeln!(out, "  {:.1} tokens/s", tps);
        }

        let s = &self.stability;
        let _ = writeln!(out, "\nStability");
        let _ = writeln!(
            out,
            "  success {}  timeout {}  structured error {}  empty output {}  busy {}  unavailable {}  skipped {}",
            s.inference_success,
            s.timeout,
            s.structured_error,
            s.empty_output,
            s.busy,
            s.unavailable,
            s.skipped
        );

        let q = &self.quality;
        let _ = writeln!(out, "\nQuality");
        let _ = writeln!(out, "  schema compliance     {:.1}%", q.schema_compliance_rate * 100.0);
        let _ = writeln!(out, "  evidence faithfulness {:.1}%", q.evidence_faithfulness_rate * 100.0);
        let _ = writeln!(out, "  valid {}  repaired {}  rejected {}", q.valid, q.repaired, q.rejected);
        if let Some(c) = q.avg_confidence {
            let _ = writeln!(out, "  avg confidence {:.2}", c);
        }
        let _ = writeln!(out, "  model assisted {}  fallback {}", q.model_assisted, q.fallback);

        let _ = writeln!(out, "\nStages");
        for st in &self.stages {
            let _ = writeln!(
                out,
                "  {:<13} {:>4}/{:<4} {:.1}%",
                st.stage.as_str(),
                st.passed,
                st.attempted,
                st.rate * 100.0
            );
        }
        out
    }
}
