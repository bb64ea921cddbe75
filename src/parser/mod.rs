//! Output parser: native return string to typed slots.
//!
//! Parsing happens in two steps. `parse_raw` splits the native wire string
//! into an error tag or a metrics prefix plus payload; it is total and never
//! fails. `decode_slots` turns the payload into `StructuredSlots` or a typed
//! `ParseError`. Neither step retries.

mod error;
mod payload;
mod raw;

pub use error::ParseError;
pub use payload::{decode_slots, strip_code_fences};
pub use raw::{parse_raw, ParserLimits, RawOutput};
