//! Fuzz target for native output parsing.
//!
//! Arbitrary native return strings must never panic the wire splitter or the
//! slot decoder, and a decoded success payload must be a suffix of the input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::parser::{decode_slots, parse_raw, ParserLimits, RawOutput};

fuzz_target!(|data: &str| {
    let limits = ParserLimits::default();

    match parse_raw(data, &limits) {
        RawOutput::Error { message, .. } => {
            assert!(data.ends_with(message.as_str()), "error message not taken from input");
        }
        RawOutput::Payload { token_count, ttft_ms, text } => {
            assert!(data.ends_with(text.as_str()), "payload not a suffix of input");
            if let Some(t) = token_count {
                assert!(t <= limits.max_token_count);
            }
            if let Some(t) = ttft_ms {
                assert!(t <= limits.max_ttft_ms);
            }
            // decode_slots() should never panic
            let _ = decode_slots(&text);
        }
    }
});
