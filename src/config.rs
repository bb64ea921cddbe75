//! Runtime configuration from environment variables and TOML files.
//!
//! Every value has a safe default. Environment values that fail to parse fall
//! back to the default without an error; TOML files are strict about syntax
//! but may omit any section or key.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SENTINEL_MAX_NEW_TOKENS` | 192 | Tokens generated per call |
//! | `SENTINEL_TIMEOUT_MS` | 8000 | Native call deadline |
//! | `SENTINEL_WAIT_GRACE_MS` | 250 | Extra wait past the deadline |
//! | `SENTINEL_CANCEL_COOLDOWN_MS` | 150 | Time given to the native loop to see cancel |
//! | `SENTINEL_UNLOAD_GRACE_MS` | 300 | Wait for an in-flight call before leaking |
//! | `SENTINEL_N_CTX` | 2048 | GGUF context window size |
//! | `SENTINEL_N_THREADS` | 0 | Decode threads (0 = auto) |
//! | `SENTINEL_MODEL_PATH` | unset | GGUF model file |
//! | `SENTINEL_VALIDATION_MODE` | lenient | `lenient` or `strict` |
//! | `SENTINEL_MAX_PROMPT_BYTES` | 6144 | Prompt byte budget |
//! | `SENTINEL_LOCALE` | en | Notice language |
//! | `SENTINEL_LOG_LEVEL` | info | `tracing` filter directive |
//! | `SENTINEL_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineTuning, InferenceConfig};
use crate::parser::ParserLimits;
use crate::pipeline::{Locale, PipelineConfig};
use crate::telemetry::{LogConfig, LogFormat};
use crate::validator::ValidationMode;

const MIN_TIMEOUT_MS: u64 = 100;
const MIN_N_CTX: u32 = 256;
const MIN_PROMPT_BYTES: usize = 512;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_ms: u64,
    pub wait_grace_ms: u64,
    pub cancel_cooldown_ms: u64,
    pub unload_grace_ms: u64,
    pub n_ctx: u32,
    pub n_threads: u32,
    pub model_path: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let inference = InferenceConfig::for_slots();
        let tuning = EngineTuning::default();
        Self {
            max_new_tokens: inference.max_new_tokens,
            temperature: inference.temperature,
            top_p: inference.top_p,
            timeout_ms: inference.timeout_ms,
            wait_grace_ms: tuning.wait_grace.as_millis() as u64,
            cancel_cooldown_ms: tuning.cancel_cooldown.as_millis() as u64,
            unload_grace_ms: tuning.unload_grace.as_millis() as u64,
            n_ctx: 2048,
            n_threads: 0,
            model_path: None,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub validation_mode: ValidationMode,
    pub max_prompt_bytes: usize,
    pub locale: Locale,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Lenient,
            max_prompt_bytes: 6144,
            locale: Locale::En,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
    pub output_path: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Json, output_path: None }
    }
}

/// All runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub engine: EngineSection,
    pub pipeline: PipelineSection,
    pub parser: ParserLimits,
    pub logging: LoggingSection,
}

/// Parse any `FromStr` env var, returning `default` on missing or invalid.
fn parse_with<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from `SENTINEL_*` environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> ExplainConfig {
    let mut config = ExplainConfig::default();
    config.apply_env();
    config
}

impl ExplainConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: ExplainConfig = toml::from_str(text)?;
        config.apply_floors();
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// File config with environment overrides on top.
    pub fn load_with_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Override values from the environment, then re-apply floors.
    pub fn apply_env(&mut self) {
        let e = &mut self.engine;
        e.max_new_tokens = parse_with("SENTINEL_MAX_NEW_TOKENS", e.max_new_tokens);
        e.timeout_ms = parse_with("SENTINEL_TIMEOUT_MS", e.timeout_ms);
        e.wait_grace_ms = parse_with("SENTINEL_WAIT_GRACE_MS", e.wait_grace_ms);
        e.cancel_cooldown_ms = parse_with("SENTINEL_CANCEL_COOLDOWN_MS", e.cancel_cooldown_ms);
        e.unload_grace_ms = parse_with("SENTINEL_UNLOAD_GRACE_MS", e.unload_grace_ms);
        e.n_ctx = parse_with("SENTINEL_N_CTX", e.n_ctx);
        e.n_threads = parse_with("SENTINEL_N_THREADS", e.n_threads);
        if let Ok(path) = std::env::var("SENTINEL_MODEL_PATH") {
            if !path.trim().is_empty() {
                e.model_path = Some(PathBuf::from(path.trim()));
            }
        }

        let p = &mut self.pipeline;
        p.validation_mode = parse_with("SENTINEL_VALIDATION_MODE", p.validation_mode);
        p.max_prompt_bytes = parse_with("SENTINEL_MAX_PROMPT_BYTES", p.max_prompt_bytes);
        p.locale = parse_with("SENTINEL_LOCALE", p.locale);

        if let Ok(level) = std::env::var("SENTINEL_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.logging.level = level.trim().to_string();
            }
        }
        self.logging.format = parse_with("SENTINEL_LOG_FORMAT", self.logging.format);

        self.apply_floors();
    }

    fn apply_floors(&mut self) {
        let e = &mut self.engine;
        e.max_new_tokens = e.max_new_tokens.max(1);
        e.timeout_ms = e.timeout_ms.max(MIN_TIMEOUT_MS);
        e.n_ctx = e.n_ctx.max(MIN_N_CTX);
        if !(e.top_p > 0.0 && e.top_p <= 1.0) {
            e.top_p = 1.0;
        }
        if !(0.0..=2.0).contains(&e.temperature) {
            e.temperature = 0.0;
        }
        self.pipeline.max_prompt_bytes = self.pipeline.max_prompt_bytes.max(MIN_PROMPT_BYTES);
        self.parser.max_digits = self.parser.max_digits.clamp(1, 19);
    }

    /// Check values that floors cannot repair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inference().validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(path) = &self.engine.model_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("engine.model_path is empty".into()));
            }
        }
        tracing_subscriber::EnvFilter::try_new(&self.logging.level)
            .map_err(|e| ConfigError::Invalid(format!("logging.level: {e}")))?;
        Ok(())
    }

    pub fn inference(&self) -> InferenceConfig {
        InferenceConfig {
            max_new_tokens: self.engine.max_new_tokens,
            temperature: self.engine.temperature,
            top_p: self.engine.top_p,
            timeout_ms: self.engine.timeout_ms,
        }
    }

    pub fn tuning(&self) -> EngineTuning {
        EngineTuning {
            wait_grace: Duration::from_millis(self.engine.wait_grace_ms),
            cancel_cooldown: Duration::from_millis(self.engine.cancel_cooldown_ms),
            unload_grace: Duration::from_millis(self.engine.unload_grace_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            inference: self.inference(),
            validation_mode: self.pipeline.validation_mode,
            max_prompt_bytes: self.pipeline.max_prompt_bytes,
            locale: self.pipeline.locale,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.logging.format,
            level: self.logging.level.clone(),
            output_path: self.logging.output_path.clone(),
        }
    }

    #[cfg(feature = "gguf")]
    pub fn gguf_options(&self) -> crate::engine::GgufOptions {
        crate::engine::GgufOptions { n_ctx: self.engine.n_ctx, n_threads: self.engine.n_threads }
    }

    /// Longest a single explain call can hold the caller.
    pub fn worst_case_call_ms(&self) -> u64 {
        self.tuning().worst_case(Duration::from_millis(self.engine.timeout_ms)).as_millis() as u64
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
