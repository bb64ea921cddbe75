//! Native backend seam.
//!
//! A `NativeBackend` owns model weights in native memory and runs one greedy
//! decode at a time. Dropping the backend releases that memory, so only the
//! session registry is allowed to drop it.

use std::time::Instant;

use super::config::GenerationParams;
use super::error::NativeError;

/// Cooperative cancel probe polled once per token by the decode loop.
pub type CancelCheck<'a> = &'a (dyn Fn() -> bool + Sync);

/// Why a decode loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Model emitted an end-of-generation token.
    Eos,
    /// Output contained a complete JSON object.
    JsonClosed,
    /// Hit `max_new_tokens`.
    MaxTokens,
    /// Cancel flag observed.
    Cancelled,
    /// Elapsed time exceeded the call timeout.
    Timeout,
}

/// Raw result of a completed decode loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_generated: u32,
    pub ttft_ms: u64,
    pub stop: StopReason,
}

/// A loaded model able to decode a prompt.
pub trait NativeBackend: Send + Sync {
    /// Stable identifier for diagnostics, e.g. `llama.cpp-gguf`.
    fn engine_id(&self) -> &'static str;

    /// Run one greedy decode. Must poll `is_cancelled` at least once per token.
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        is_cancelled: CancelCheck<'_>,
    ) -> Result<Generation, NativeError>;
}

/// Per-token bookkeeping shared by backends.
#[derive(Debug)]
pub struct DecodeClock {
    start: Instant,
    ttft_ms: Option<u64>,
    generated: u32,
}

impl DecodeClock {
    pub fn start() -> Self {
        Self { start: Instant::now(), ttft_ms: None, generated: 0 }
    }

    /// Check cancel and timeout before producing the next token.
    pub fn should_stop(
        &self,
        params: &GenerationParams,
        is_cancelled: CancelCheck<'_>,
    ) -> Option<StopReason> {
        if is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.start.elapsed() > params.timeout {
            return Some(StopReason::Timeout);
        }
        None
    }

    pub fn record_token(&mut self) {
        self.generated += 1;
        if self.generated == 1 {
            self.ttft_ms = Some(self.start.elapsed().as_millis() as u64);
        }
    }

    pub fn finish(self, text: String, stop: StopReason) -> Generation {
        Generation {
            text,
            tokens_generated: self.generated,
            ttft_ms: self.ttft_ms.unwrap_or(0),
            stop,
        }
    }
}

/// True once `text` contains a complete top-level JSON object.
///
/// Ignores everything before the first `{`, tracks string state so braces
/// inside strings do not count, and treats a quote as escaped only when it
/// follows an odd run of backslashes. Control characters reset the run.
pub fn is_json_object_closed(text: &str) -> bool {
    let mut depth = 0i32;
    let mut seen_open = false;
    let mut in_string = false;
    let mut backslashes = 0usize;

    for c in text.chars() {
        if !seen_open && c != '{' {
            continue;
        }
        if (c as u32) < 0x20 {
            backslashes = 0;
            continue;
        }
        if c == '\\' {
            backslashes += 1;
            continue;
        }
        let escaped = backslashes % 2 == 1;
        backslashes = 0;

        if c == '"' && !escaped {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => {
                depth += 1;
                seen_open = true;
            }
            '}' => depth -= 1,
            _ => {}
        }
        if seen_open && depth == 0 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_object_detected_after_preamble() {
        assert!(is_json_object_closed("Sure: {\"a\":1}"));
        assert!(!is_json_object_closed("{\"a\":{\"b\":1}"));
        assert!(!is_json_object_closed("no json here"));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert!(!is_json_object_closed("{\"a\":\"}\""));
        assert!(is_json_object_closed("{\"a\":\"}\"}"));
    }

    #[test]
    fn escaped_quotes_follow_backslash_parity() {
        // \" keeps the string open, so the brace is content.
        assert!(!is_json_object_closed(r#"{"a":"x\"}"#));
        // \\" closes the string, so the brace ends the object.
        assert!(is_json_object_closed(r#"{"a":"x\\"}"#));
    }

    #[test]
    fn control_characters_reset_escape_run() {
        assert!(is_json_object_closed("{\"a\":\"x\\\n\"}"));
    }

    #[test]
    fn decode_clock_reports_ttft_only_after_first_token() {
        let clock = DecodeClock::start();
        let generation = clock.finish(String::new(), StopReason::Eos);
        assert_eq!(generation.tokens_generated, 0);
        assert_eq!(generation.ttft_ms, 0);
    }
}
