//! Fuzz target for prompt label sanitization.
//!
//! Untrusted labels must never carry control characters or chat-template
//! delimiters into the prompt, whatever their casing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::pipeline::PromptBuilder;

fuzz_target!(|data: &str| {
    let builder = PromptBuilder::default();
    let clean = builder.sanitize(data);

    assert!(clean.chars().count() <= 64, "label not bounded");
    assert!(!clean.chars().any(char::is_control), "control character survived");
    let lower = clean.to_ascii_lowercase();
    assert!(!lower.contains("<|"), "template delimiter survived");
    assert!(!lower.contains("|>"), "template delimiter survived");
});
