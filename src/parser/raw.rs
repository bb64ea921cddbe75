//! Native wire string splitting.
//!
//! Success: `TOKEN_COUNT|TTFT_MS|text`. Error: `ERR|CODE|message`.
//! Metrics that are missing, malformed or implausible come back as `None`;
//! they are never guessed from the payload.

use serde::{Deserialize, Serialize};

use crate::engine::NativeErrorCode;

const ERROR_PREFIX: &str = "ERR|";
const SEPARATOR: u8 = b'|';

/// Bounds applied to the metrics prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    /// Longest digit run accepted for either metric field.
    pub max_digits: usize,
    /// Token counts above this are treated as unknown.
    pub max_token_count: u32,
    /// TTFT values above this are treated as unknown.
    pub max_ttft_ms: u64,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_digits: 7,
            max_token_count: 100_000,
            max_ttft_ms: 600_000,
        }
    }
}

/// Native return split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    /// Typed error tag, passed through without metric extraction.
    Error { code: NativeErrorCode, message: String },
    Payload {
        token_count: Option<u32>,
        ttft_ms: Option<u64>,
        text: String,
    },
}

impl RawOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Split a native return string. Total: every input yields a `RawOutput`.
pub fn parse_raw(raw: &str, limits: &ParserLimits) -> RawOutput {
    if let Some(rest) = raw.strip_prefix(ERROR_PREFIX) {
        let (code, message) = rest.split_once('|').unwrap_or((rest, ""));
        return RawOutput::Error {
            code: NativeErrorCode::from_wire(code.trim()),
            message: message.to_string(),
        };
    }

    let Some((count_field, after_count)) = split_digit_field(raw, limits.max_digits) else {
        return RawOutput::Payload { token_count: None, ttft_ms: None, text: raw.to_string() };
    };
    let token_count = count_field
        .parse::<u32>()
        .ok()
        .filter(|n| *n <= limits.max_token_count);

    match split_digit_field(after_count, limits.max_digits) {
        Some((ttft_field, text)) => {
            let ttft_ms = ttft_field.parse::<u64>().ok().filter(|n| *n <= limits.max_ttft_ms);
            RawOutput::Payload { token_count, ttft_ms, text: text.to_string() }
        }
        None => RawOutput::Payload { token_count, ttft_ms: None, text: after_count.to_string() },
    }
}

/// Split `digits|rest` when the separator sits within `max_digits + 1` bytes
/// and everything before it is an ASCII digit.
fn split_digit_field(s: &str, max_digits: usize) -> Option<(&str, &str)> {
    let idx = s
        .as_bytes()
        .iter()
        .take(max_digits + 1)
        .position(|&b| b == SEPARATOR)?;
    let field = &s[..idx];
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((field, &s[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RawOutput {
        parse_raw(raw, &ParserLimits::default())
    }

    #[test]
    fn full_metrics_prefix() {
        assert_eq!(
            parse("42|118|{\"a\":1}"),
            RawOutput::Payload { token_count: Some(42), ttft_ms: Some(118), text: "{\"a\":1}".into() }
        );
    }

    #[test]
    fn payload_may_contain_separators() {
        let RawOutput::Payload { text, .. } = parse("3|9|a|b|c") else { panic!() };
        assert_eq!(text, "a|b|c");
    }

    #[test]
    fn missing_prefix_keeps_whole_string_and_unknown_metrics() {
        assert_eq!(
            parse("{\"a\":1}"),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: "{\"a\":1}".into() }
        );
    }

    #[test]
    fn overlong_digit_prefix_is_payload() {
        let raw = "12345678|5|text";
        assert_eq!(
            parse(raw),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: raw.into() }
        );
    }

    #[test]
    fn non_digit_prefix_is_payload() {
        let raw = "ab|5|text";
        let RawOutput::Payload { token_count, text, .. } = parse(raw) else { panic!() };
        assert_eq!(token_count, None);
        assert_eq!(text, raw);
    }

    #[test]
    fn implausible_metrics_become_unknown() {
        assert_eq!(
            parse("9999999|9999999|x"),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: "x".into() }
        );
    }

    #[test]
    fn malformed_ttft_leaves_remainder_after_count() {
        assert_eq!(
            parse("12|fast|x"),
            RawOutput::Payload { token_count: Some(12), ttft_ms: None, text: "fast|x".into() }
        );
    }

    #[test]
    fn error_tags_pass_through() {
        assert_eq!(
            parse("ERR|STALE_HANDLE|handle not in registry"),
            RawOutput::Error {
                code: NativeErrorCode::StaleHandle,
                message: "handle not in registry".into()
            }
        );
        assert_eq!(
            parse("ERR|GPU_LOST"),
            RawOutput::Error { code: NativeErrorCode::Other("GPU_LOST".into()), message: String::new() }
        );
    }

    #[test]
    fn empty_and_multibyte_inputs_are_total() {
        assert_eq!(
            parse(""),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: String::new() }
        );
        let RawOutput::Payload { text, .. } = parse("1|2|Überprüfung ✓") else { panic!() };
        assert_eq!(text, "Überprüfung ✓");
        let RawOutput::Payload { token_count, .. } = parse("äöü|x") else { panic!() };
        assert_eq!(token_count, None);
    }

    #[test]
    fn ceilings_are_configurable() {
        let limits = ParserLimits { max_digits: 3, max_token_count: 50, max_ttft_ms: 10 };
        assert_eq!(
            parse_raw("60|11|x", &limits),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: "x".into() }
        );
        assert_eq!(
            parse_raw("1234|1|x", &limits),
            RawOutput::Payload { token_count: None, ttft_ms: None, text: "1234|1|x".into() }
        );
    }
}
