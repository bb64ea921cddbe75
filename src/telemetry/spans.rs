//! The `explain_request` span.

use tracing::span::Entered;
use tracing::{field, info_span, Span};

use crate::pipeline::Attribution;

/// One span per explanation. Outcome fields stay empty until `finish`.
pub struct ExplainSpan(Span);

impl ExplainSpan {
    pub fn new(request_id: &str, incident_id: &str) -> Self {
        Self(info_span!(
            "explain_request",
            request_id = %request_id,
            incident_id = %incident_id,
            attribution = field::Empty,
            fallback_cause = field::Empty,
            latency_ms = field::Empty,
        ))
    }

    pub fn enter(&self) -> Entered<'_> {
        self.0.enter()
    }

    /// Record how the answer was produced.
    pub fn finish(&self, attribution: &Attribution, latency_ms: u64) {
        self.0.record("attribution", attribution.as_str());
        if let Some(cause) = attribution.fallback_cause() {
            self.0.record("fallback_cause", cause.as_str());
        }
        self.0.record("latency_ms", latency_ms);
    }
}
