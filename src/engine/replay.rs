//! Scripted backend that replays recorded model output.
//!
//! Used by the self-test harness when no model file is present and by the
//! test suite to drive the execution core through every failure path. Output
//! is emitted in four-character "tokens" through the same `DecodeClock` and
//! closed-object check a real backend uses, so cancel, timeout and early
//! stop behave like a live decode.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::backend::{is_json_object_closed, CancelCheck, DecodeClock, Generation, NativeBackend, StopReason};
use super::config::GenerationParams;
use super::error::{EngineError, NativeError, NativeErrorCode};

const CHARS_PER_TOKEN: usize = 4;

/// One scripted reaction to a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    /// Decode this text token by token.
    Respond(String),
    /// Fail with a typed native error.
    Fail(NativeErrorCode, String),
    /// Block for the duration without polling cancel, then return nothing.
    Hang(Duration),
}

/// Counters observable from tests after the backend is boxed away.
#[derive(Debug, Default)]
pub struct ReplayProbes {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
    released: AtomicBool,
}

impl ReplayProbes {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `generate` calls seen.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// True once the backend has been dropped (native memory freed).
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a ReplayProbes);

impl<'a> ActiveGuard<'a> {
    fn enter(probes: &'a ReplayProbes) -> Self {
        probes.calls.fetch_add(1, Ordering::SeqCst);
        let now = probes.active.fetch_add(1, Ordering::SeqCst) + 1;
        probes.max_concurrent.fetch_max(now, Ordering::SeqCst);
        Self(probes)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Script {
    /// First entry whose key occurs in the prompt wins.
    Keyed(Vec<(String, ReplayStep)>),
    /// Steps consumed in order, cycling once exhausted.
    Sequence(Vec<ReplayStep>),
}

pub struct ReplayBackend {
    script: Script,
    cursor: AtomicUsize,
    token_delay: Duration,
    probes: Arc<ReplayProbes>,
}

impl ReplayBackend {
    pub fn keyed(entries: Vec<(String, ReplayStep)>) -> Self {
        Self::with_script(Script::Keyed(entries))
    }

    pub fn sequence(steps: Vec<ReplayStep>) -> Self {
        Self::with_script(Script::Sequence(steps))
    }

    /// Backend that answers every prompt with the same text.
    pub fn constant(text: impl Into<String>) -> Self {
        Self::sequence(vec![ReplayStep::Respond(text.into())])
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
            token_delay: Duration::ZERO,
            probes: Arc::new(ReplayProbes::default()),
        }
    }

    /// Sleep this long before each emitted token.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn probes(&self) -> Arc<ReplayProbes> {
        Arc::clone(&self.probes)
    }

    /// Load a keyed script from JSON.
    ///
    /// ```json
    /// { "token_delay_ms": 0,
    ///   "entries": [ { "key": "inc-1", "output": "{...}" },
    ///                { "key": "inc-2", "error": "DECODE|llama_decode failed" } ] }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let script: ReplayScript = serde_json::from_str(json)
            .map_err(|e| EngineError::ModelLoad(format!("replay script: {e}")))?;
        let mut entries = Vec::with_capacity(script.entries.len());
        for entry in script.entries {
            entries.push((entry.key.clone(), entry.into_step()?));
        }
        Ok(Self::keyed(entries).with_token_delay(Duration::from_millis(script.token_delay_ms)))
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ModelLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    fn next_step(&self, prompt: &str) -> Option<ReplayStep> {
        match &self.script {
            Script::Keyed(entries) => entries
                .iter()
                .find(|(key, _)| prompt.contains(key.as_str()))
                .map(|(_, step)| step.clone()),
            Script::Sequence(steps) if steps.is_empty() => None,
            Script::Sequence(steps) => {
                let i = self.cursor.fetch_add(1, Ordering::SeqCst) % steps.len();
                Some(steps[i].clone())
            }
        }
    }

    fn decode(
        &self,
        text: &str,
        params: &GenerationParams,
        is_cancelled: CancelCheck<'_>,
    ) -> Generation {
        let mut clock = DecodeClock::start();
        let mut out = String::new();
        let chars: Vec<char> = text.chars().collect();
        let mut produced = 0u32;

        for chunk in chars.chunks(CHARS_PER_TOKEN) {
            if let Some(stop) = clock.should_stop(params, is_cancelled) {
                return clock.finish(out, stop);
            }
            if produced >= params.max_new_tokens {
                return clock.finish(out, StopReason::MaxTokens);
            }
            if !self.token_delay.is_zero() {
                std::thread::sleep(self.token_delay);
            }
            out.extend(chunk.iter());
            clock.record_token();
            produced += 1;
            if is_json_object_closed(&out) {
                return clock.finish(out, StopReason::JsonClosed);
            }
        }
        clock.finish(out, StopReason::Eos)
    }
}

impl NativeBackend for ReplayBackend {
    fn engine_id(&self) -> &'static str {
        "replay"
    }

    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        is_cancelled: CancelCheck<'_>,
    ) -> Result<Generation, NativeError> {
        let _active = ActiveGuard::enter(&self.probes);
        match self.next_step(prompt) {
            Some(ReplayStep::Respond(text)) => Ok(self.decode(&text, params, is_cancelled)),
            Some(ReplayStep::Fail(code, message)) => Err(NativeError::new(code, message)),
            Some(ReplayStep::Hang(duration)) => {
                std::thread::sleep(duration);
                Ok(DecodeClock::start().finish(String::new(), StopReason::Eos))
            }
            None => Err(NativeError::new(NativeErrorCode::Decode, "no replay entry matches prompt")),
        }
    }
}

impl Drop for ReplayBackend {
    fn drop(&mut self) {
        self.probes.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    token_delay_ms: u64,
    entries: Vec<ReplayEntry>,
}

#[derive(Debug, Deserialize)]
struct ReplayEntry {
    key: String,
    #[serde(default)]
    output: Option<String>,
    /// `CODE|message`
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    hang_ms: Option<u64>,
}

impl ReplayEntry {
    fn into_step(self) -> Result<ReplayStep, EngineError> {
        match (self.output, self.error, self.hang_ms) {
            (Some(text), None, None) => Ok(ReplayStep::Respond(text)),
            (None, Some(error), None) => {
                let (code, message) = error.split_once('|').unwrap_or((error.as_str(), ""));
                Ok(ReplayStep::Fail(NativeErrorCode::from_wire(code), message.to_string()))
            }
            (None, None, Some(ms)) => Ok(ReplayStep::Hang(Duration::from_millis(ms))),
            _ => Err(EngineError::ModelLoad(format!(
                "replay entry '{}' must set exactly one of output, error, hang_ms",
                self.key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams {
            max_new_tokens: 64,
            top_p: 1.0,
            timeout: Duration::from_secs(5),
        }
    }

    fn never() -> bool {
        false
    }

    #[test]
    fn keyed_script_matches_on_prompt_substring() {
        let backend = ReplayBackend::keyed(vec![
            ("inc-a".into(), ReplayStep::Respond("{\"x\":1}".into())),
            ("inc-b".into(), ReplayStep::Fail(NativeErrorCode::Decode, "boom".into())),
        ]);
        let ok = backend.generate("incident inc-a", &params(), &never).unwrap();
        assert_eq!(ok.text, "{\"x\":1}");
        let err = backend.generate("incident inc-b", &params(), &never).unwrap_err();
        assert_eq!(err.code, NativeErrorCode::Decode);
    }

    #[test]
    fn decode_stops_once_object_closes() {
        let backend = ReplayBackend::constant("{\"a\":1} trailing chatter");
        let generation = backend.generate("p", &params(), &never).unwrap();
        assert_eq!(generation.stop, StopReason::JsonClosed);
        assert!(generation.text.starts_with("{\"a\":1}"));
        assert!(!generation.text.contains("chatter"));
    }

    #[test]
    fn max_tokens_bounds_output() {
        let backend = ReplayBackend::constant("x".repeat(100));
        let p = GenerationParams { max_new_tokens: 3, ..params() };
        let generation = backend.generate("p", &p, &never).unwrap();
        assert_eq!(generation.stop, StopReason::MaxTokens);
        assert_eq!(generation.tokens_generated, 3);
        assert_eq!(generation.text.len(), 12);
    }

    #[test]
    fn cancel_is_observed_before_first_token() {
        let backend = ReplayBackend::constant("{\"a\":1}");
        let cancelled = || true;
        let generation = backend.generate("p", &params(), &cancelled).unwrap();
        assert_eq!(generation.stop, StopReason::Cancelled);
        assert_eq!(generation.tokens_generated, 0);
    }

    #[test]
    fn drop_marks_release() {
        let backend = ReplayBackend::constant("{}");
        let probes = backend.probes();
        assert!(!probes.released());
        drop(backend);
        assert!(probes.released());
    }

    #[test]
    fn script_json_loads_all_step_kinds() {
        let json = r#"{
            "token_delay_ms": 1,
            "entries": [
                { "key": "a", "output": "{}" },
                { "key": "b", "error": "CTX_OVERFLOW|too long" },
                { "key": "c", "hang_ms": 5 }
            ]
        }"#;
        let backend = ReplayBackend::from_json_str(json).unwrap();
        let err = backend.generate("b", &params(), &never).unwrap_err();
        assert_eq!(err.code, NativeErrorCode::ContextOverflow);
        assert_eq!(err.message, "too long");
    }

    #[test]
    fn script_entry_with_two_actions_is_rejected() {
        let json = r#"{ "entries": [ { "key": "a", "output": "{}", "hang_ms": 5 } ] }"#;
        assert!(ReplayBackend::from_json_str(json).is_err());
    }
}
