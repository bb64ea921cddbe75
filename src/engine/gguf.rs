//! llama-cpp-2 backend for GGUF models.
//!
//! Greedy decode with a fresh context per call. The loop polls the cancel
//! probe and the elapsed-time deadline before every token and stops as soon
//! as the output holds a closed JSON object.

use std::num::NonZeroU32;
use std::path::Path;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;

use super::backend::{is_json_object_closed, CancelCheck, DecodeClock, Generation, NativeBackend, StopReason};
use super::config::GenerationParams;
use super::error::{EngineError, NativeError, NativeErrorCode};

/// GGUF load options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufOptions {
    /// Context window in tokens.
    pub n_ctx: u32,
    /// Decode threads; 0 resolves from the CPU count.
    pub n_threads: u32,
}

impl Default for GgufOptions {
    fn default() -> Self {
        Self { n_ctx: 2048, n_threads: 0 }
    }
}

/// Loaded llama.cpp model and backend.
pub struct GgufSession {
    backend: LlamaBackend,
    model: LlamaModel,
    n_ctx: u32,
    n_threads: i32,
}

// SAFETY: LlamaModel and LlamaBackend are Send+Sync in llama-cpp-2; each
// decode creates its own LlamaContext, which never leaves the calling thread.
unsafe impl Send for GgufSession {}
unsafe impl Sync for GgufSession {}

impl GgufSession {
    pub fn load(path: &Path, options: GgufOptions) -> Result<Self, EngineError> {
        let backend = LlamaBackend::init()
            .map_err(|e| EngineError::ModelLoad(format!("backend init: {e}")))?;
        let model = LlamaModel::load_from_file(&backend, path, &LlamaModelParams::default())
            .map_err(|e| EngineError::ModelLoad(format!("load {}: {e}", path.display())))?;
        Ok(Self {
            backend,
            model,
            n_ctx: options.n_ctx.max(256),
            n_threads: resolve_threads(options.n_threads),
        })
    }

    fn tokenize(&self, text: &str) -> Result<Vec<LlamaToken>, NativeError> {
        self.model
            .str_to_token(text, AddBos::Always)
            .map_err(|e| NativeError::new(NativeErrorCode::Tokenize, e.to_string()))
    }

    fn create_context(&self) -> Result<LlamaContext<'_>, NativeError> {
        let p = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.n_ctx))
            .with_n_threads(self.n_threads)
            .with_n_threads_batch(self.n_threads);
        self.model
            .new_context(&self.backend, p)
            .map_err(|e| NativeError::new(NativeErrorCode::NullContext, e.to_string()))
    }
}

impl NativeBackend for GgufSession {
    fn engine_id(&self) -> &'static str {
        "llama.cpp-gguf"
    }

    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        is_cancelled: CancelCheck<'_>,
    ) -> Result<Generation, NativeError> {
        let tokens = self.tokenize(prompt)?;
        let budget = tokens.len() + params.max_new_tokens as usize;
        if budget > self.n_ctx as usize {
            return Err(NativeError::new(
                NativeErrorCode::ContextOverflow,
                format!("{} prompt tokens + {} new exceeds n_ctx {}", tokens.len(), params.max_new_tokens, self.n_ctx),
            ));
        }

        let mut clock = DecodeClock::start();
        let mut ctx = self.create_context()?;
        let mut batch = LlamaBatch::new(tokens.len().max(1), 1);
        add_seq(&mut batch, &tokens)?;
        decode(&mut ctx, &mut batch)?;

        let mut sampler = LlamaSampler::greedy();
        let mut utf8 = encoding_rs::UTF_8.new_decoder();
        let mut text = String::new();
        let mut pos = tokens.len() as i32;

        for _ in 0..params.max_new_tokens {
            if let Some(stop) = clock.should_stop(params, is_cancelled) {
                return Ok(clock.finish(text, stop));
            }
            let tok = sampler.sample(&ctx, -1);
            sampler.accept(tok);
            if self.model.is_eog_token(tok) {
                return Ok(clock.finish(text, StopReason::Eos));
            }
            let piece = self
                .model
                .token_to_piece(tok, &mut utf8, false, None)
                .map_err(|e| NativeError::new(NativeErrorCode::Decode, format!("detok: {e}")))?;
            text.push_str(&piece);
            clock.record_token();
            if is_json_object_closed(&text) {
                return Ok(clock.finish(text, StopReason::JsonClosed));
            }
            batch.clear();
            batch
                .add(tok, pos, &[0], true)
                .map_err(|e| NativeError::new(NativeErrorCode::Decode, format!("batch: {e}")))?;
            decode(&mut ctx, &mut batch)?;
            pos += 1;
        }
        Ok(clock.finish(text, StopReason::MaxTokens))
    }
}

fn add_seq(batch: &mut LlamaBatch, tokens: &[LlamaToken]) -> Result<(), NativeError> {
    let n = tokens.len();
    for (i, &tok) in tokens.iter().enumerate() {
        // Logits only for the last prompt token.
        batch
            .add(tok, i as i32, &[0], i + 1 == n)
            .map_err(|e| NativeError::new(NativeErrorCode::Decode, format!("batch: {e}")))?;
    }
    Ok(())
}

fn decode(ctx: &mut LlamaContext<'_>, batch: &mut LlamaBatch) -> Result<(), NativeError> {
    ctx.decode(batch)
        .map_err(|e| NativeError::new(NativeErrorCode::Decode, e.to_string()))
}

fn resolve_threads(n: u32) -> i32 {
    if n == 0 {
        // Small models: all logical cores, capped where returns diminish.
        let optimal = num_cpus::get().clamp(1, 16);
        i32::try_from(optimal).unwrap_or(4)
    } else {
        i32::try_from(n).unwrap_or(4)
    }
}
