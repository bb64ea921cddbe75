//! Metric names and recording helpers over the `metrics` facade.

use metrics::{counter, histogram};

use crate::engine::UnloadOutcome;

const INFERENCE_TOTAL: &str = "sentinel_inference_total";
const INFERENCE_LATENCY_MS: &str = "sentinel_inference_latency_ms";
const VALIDATION_TOTAL: &str = "sentinel_validation_total";
const FALLBACK_TOTAL: &str = "sentinel_fallback_total";
const EXPLANATION_TOTAL: &str = "sentinel_explanation_total";
const EXPLANATION_LATENCY_MS: &str = "sentinel_explanation_latency_ms";
const UNLOAD_TOTAL: &str = "sentinel_session_unload_total";

/// One `run_inference` call, labelled `success` or by failure kind.
pub fn record_inference(outcome: &str, elapsed_ms: u64) {
    counter!(INFERENCE_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(INFERENCE_LATENCY_MS, "outcome" => outcome.to_string()).record(elapsed_ms as f64);
}

pub fn record_validation(outcome: &'static str, mode: &'static str) {
    counter!(VALIDATION_TOTAL, "outcome" => outcome, "mode" => mode).increment(1);
}

pub fn record_fallback(cause: &'static str) {
    counter!(FALLBACK_TOTAL, "cause" => cause).increment(1);
}

/// One completed `explain`, labelled by attribution.
pub fn record_explanation(attribution: &'static str, latency_ms: u64) {
    counter!(EXPLANATION_TOTAL, "attribution" => attribution).increment(1);
    histogram!(EXPLANATION_LATENCY_MS).record(latency_ms as f64);
}

pub fn record_unload(outcome: UnloadOutcome) {
    let label = match outcome {
        UnloadOutcome::Freed => "freed",
        UnloadOutcome::Leaked => "leaked",
        UnloadOutcome::NotFound => "not_found",
    };
    counter!(UNLOAD_TOTAL, "outcome" => label).increment(1);
}
