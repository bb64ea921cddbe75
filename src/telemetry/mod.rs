//! Telemetry for Sentinel CORE.
//!
//! Structured logging via `tracing`, per-explanation spans, and counters and
//! histograms through the `metrics` facade. Nothing here opens a network
//! connection; without an installed recorder the metric calls are no-ops.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_explanation, record_fallback, record_inference, record_unload, record_validation};
pub use spans::ExplainSpan;
