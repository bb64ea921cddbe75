//! Permissive payload decoding.
//!
//! Small models wrap JSON in markdown fences or add a sentence before and
//! after it. Both are tolerated; anything else about the shape is not.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::ParseError;
use crate::slots::{StructuredSlots, REQUIRED_FIELDS};

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Fence lines like ``` or ```json, anywhere in the payload.
    FENCE.get_or_init(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*\r?$").unwrap())
}

/// Remove markdown code-fence lines, keeping what was between them.
pub fn strip_code_fences(payload: &str) -> String {
    fence_pattern().replace_all(payload, "").into_owned()
}

/// Decode a payload into slots.
pub fn decode_slots(payload: &str) -> Result<StructuredSlots, ParseError> {
    let unfenced = strip_code_fences(payload);
    let trimmed = unfenced.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyPayload);
    }

    let value = match object_span(trimmed) {
        Some(span) => serde_json::from_str::<Value>(span)
            .map_err(|e| ParseError::Malformed(e.to_string()))?,
        None => {
            // Valid JSON that is not an object is reported as such.
            return Err(match serde_json::from_str::<Value>(trimmed) {
                Ok(_) => ParseError::NotAnObject,
                Err(e) => ParseError::Malformed(e.to_string()),
            });
        }
    };

    let Value::Object(map) = &value else {
        return Err(ParseError::NotAnObject);
    };
    for field in REQUIRED_FIELDS {
        if !map.contains_key(field) {
            return Err(ParseError::MissingField(field));
        }
    }

    serde_json::from_value(value).map_err(|e| ParseError::WrongShape(e.to_string()))
}

/// Slice from the first `{` to the last `}`.
fn object_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
