//! Execution core for Sentinel CORE.
//!
//! Owns native inference sessions: loading into a generation-tagged
//! registry, single-flight execution on a per-session worker thread, real
//! timeouts with cooperative cancel, and idempotent unload that never frees
//! memory an in-flight call may still touch.

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
#[cfg(feature = "gguf")]
pub mod gguf;
pub mod registry;
pub mod replay;
pub mod result;

mod session;
mod worker;

pub use backend::{is_json_object_closed, CancelCheck, DecodeClock, Generation, NativeBackend, StopReason};
pub use config::{EngineTuning, GenerationParams, InferenceConfig};
pub use error::{EngineError, FailureKind, NativeError, NativeErrorCode};
pub use executor::{EngineDiagnostics, ExecutionCore, RUNTIME_ID};
pub use registry::{SessionHandle, SessionRegistry, UnloadOutcome};
pub use replay::{ReplayBackend, ReplayProbes, ReplayStep};
pub use result::InferenceResult;
pub use session::SessionState;
pub use worker::CancelToken;

#[cfg(feature = "gguf")]
pub use gguf::{GgufOptions, GgufSession};
