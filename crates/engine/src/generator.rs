//! Generator — the capability interface every model backend implements.
//!
//! Call sites depend on this trait, never on a concrete pipeline
//! object. The tokenizer is exposed so the context layer can count
//! tokens with exactly the scheme the model generates with; a backend
//! without one (stubs, remote endpoints) returns `None` and counting
//! degrades to the heuristic.

use async_trait::async_trait;
use pitchpal_core::ModelError;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (<= 0.0 means greedy/deterministic).
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// The result of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// The generated text, cleaned of trailing special tokens.
    pub text: String,
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
}

/// A loaded generation pipeline.
///
/// `generate` is synchronous and CPU-bound; callers run it on a
/// blocking thread (`spawn_blocking`) so it never stalls the
/// cooperative scheduler.
pub trait Generator: Send + Sync {
    /// The model this generator serves.
    fn model_name(&self) -> &str;

    /// The tokenizer matching the generation scheme, if the backend
    /// has one.
    fn tokenizer(&self) -> Option<Arc<Tokenizer>>;

    /// Generate a completion for the assembled prompt.
    fn generate(&self, prompt: &str, params: &GenerationParams)
    -> Result<GenerationOutput, ModelError>;
}

/// Loads a [`Generator`] for a model name. The seam between the cache
/// (which owns single-flight coordination) and the backend (which
/// owns the slow, fallible load).
#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    async fn load(&self, model_name: &str) -> Result<Arc<dyn Generator>, ModelError>;
}
