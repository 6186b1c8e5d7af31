//! Local inference backend — runs GGUF-quantized models on-device.
//!
//! Uses [Candle](https://github.com/huggingface/candle) to run
//! quantized llama-architecture models with no remote API. Model and
//! tokenizer files come from the HuggingFace Hub (cached on disk) or
//! from an explicit `.gguf` path.
//!
//! Supported presets:
//! - **TinyLlama** (1.1B, Q4_K_M ~670 MB) — the default
//! - **SmolLM** (135M–1.7B) — smallest practical models
//! - **Phi-2** (2.7B) — better quality on modest hardware
//! - **Qwen2** (0.5B–1.5B)
//!
//! The assembled prompt arrives as a finished string; this layer does
//! not reformat it.

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama as qlm;
use hf_hub::api::sync::Api;
use pitchpal_core::ModelError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::generator::{GenerationOutput, GenerationParams, Generator, ModelLoader};

// ── Well-known model aliases ───────────────────────────────────────────

/// Friendly aliases resolving to HuggingFace repos and filenames.
struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    let alias_lower = alias.to_lowercase();
    match alias_lower.as_str() {
        "tinyllama" | "tiny-llama" | "tinyllama-1.1b" => Some(ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF",
            gguf_file: "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-Chat-v1.0",
        }),
        "smollm" | "smollm:135m" | "smollm-135m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-135M-Instruct-GGUF",
            gguf_file: "smollm-135m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-135M-Instruct",
        }),
        "smollm:360m" | "smollm-360m" => Some(ModelPreset {
            repo: "TheBloke/SmolLM-360M-Instruct-GGUF",
            gguf_file: "smollm-360m-instruct.Q4_K_M.gguf",
            tokenizer_repo: "HuggingFaceTB/SmolLM-360M-Instruct",
        }),
        "phi2" | "phi-2" => Some(ModelPreset {
            repo: "TheBloke/phi-2-GGUF",
            gguf_file: "phi-2.Q4_K_M.gguf",
            tokenizer_repo: "microsoft/phi-2",
        }),
        "qwen:0.5b" | "qwen-0.5b" | "qwen2-0.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-0.5B-Instruct-GGUF",
            gguf_file: "qwen2-0_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-0.5B-Instruct",
        }),
        "qwen:1.5b" | "qwen-1.5b" | "qwen2-1.5b" => Some(ModelPreset {
            repo: "Qwen/Qwen2-1.5B-Instruct-GGUF",
            gguf_file: "qwen2-1_5b-instruct-q4_k_m.gguf",
            tokenizer_repo: "Qwen/Qwen2-1.5B-Instruct",
        }),
        _ => None,
    }
}

/// Preset aliases accepted by [`CandleLoader`].
pub fn available_presets() -> Vec<&'static str> {
    vec![
        "tinyllama",
        "smollm",
        "smollm:135m",
        "smollm:360m",
        "phi2",
        "qwen:0.5b",
        "qwen:1.5b",
    ]
}

// ── Loader ─────────────────────────────────────────────────────────────

/// Loads GGUF models into a [`CandleGenerator`].
///
/// Downloading and weight parsing are blocking filesystem/network
/// work, so `load` runs them on a blocking thread.
#[derive(Default)]
pub struct CandleLoader;

impl CandleLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelLoader for CandleLoader {
    async fn load(&self, model_name: &str) -> Result<Arc<dyn Generator>, ModelError> {
        let name = model_name.to_string();
        let generator = tokio::task::spawn_blocking(move || CandleGenerator::load(&name))
            .await
            .map_err(|e| ModelError::TaskFailed(format!("model load task panicked: {e}")))??;
        Ok(Arc::new(generator))
    }
}

// ── Generator ──────────────────────────────────────────────────────────

/// A loaded quantized-llama pipeline.
///
/// The weights sit behind a sync Mutex because Candle's forward pass
/// mutates KV-cache state; generation is serialized per model. The
/// tokenizer lives outside the lock so token counting never contends
/// with inference.
pub struct CandleGenerator {
    model_name: String,
    tokenizer: Arc<Tokenizer>,
    model: Mutex<qlm::ModelWeights>,
    device: Device,
    eos_token_id: u32,
}

impl CandleGenerator {
    /// Load by preset alias or explicit `.gguf` path.
    fn load(model_name: &str) -> Result<Self, ModelError> {
        let device = Device::Cpu;

        let (model_path, tokenizer_path) = if Path::new(model_name).exists()
            && model_name.ends_with(".gguf")
        {
            let path = Path::new(model_name);
            let tokenizer_path = path.with_file_name("tokenizer.json");
            if !tokenizer_path.exists() {
                return Err(ModelError::LoadFailed {
                    model: model_name.to_string(),
                    reason: format!(
                        "no tokenizer.json next to {}",
                        path.display()
                    ),
                });
            }
            (path.to_path_buf(), tokenizer_path)
        } else {
            let preset = resolve_preset(model_name).ok_or_else(|| {
                ModelError::UnknownModel(format!(
                    "unknown model '{}'; presets: {}, or a path to a .gguf file",
                    model_name,
                    available_presets().join(", ")
                ))
            })?;

            info!(
                model = model_name,
                repo = preset.repo,
                file = preset.gguf_file,
                "Downloading/loading model"
            );

            let api = Api::new().map_err(|e| ModelError::LoadFailed {
                model: model_name.to_string(),
                reason: format!("HuggingFace Hub API init failed: {e}"),
            })?;

            let model_path = api
                .model(preset.repo.to_string())
                .get(preset.gguf_file)
                .map_err(|e| ModelError::LoadFailed {
                    model: model_name.to_string(),
                    reason: format!("download of '{}' failed: {e}", preset.gguf_file),
                })?;

            let tokenizer_path = api
                .model(preset.tokenizer_repo.to_string())
                .get("tokenizer.json")
                .map_err(|e| ModelError::LoadFailed {
                    model: model_name.to_string(),
                    reason: format!("tokenizer download from '{}' failed: {e}", preset.tokenizer_repo),
                })?;

            (model_path, tokenizer_path)
        };

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            ModelError::LoadFailed {
                model: model_name.to_string(),
                reason: format!("tokenizer load failed: {e}"),
            }
        })?;

        let mut file = std::fs::File::open(&model_path).map_err(|e| ModelError::LoadFailed {
            model: model_name.to_string(),
            reason: format!("cannot open model file: {e}"),
        })?;
        let gguf = gguf_file::Content::read(&mut file).map_err(|e| ModelError::LoadFailed {
            model: model_name.to_string(),
            reason: format!("GGUF parse failed: {e}"),
        })?;
        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(|e| {
            ModelError::LoadFailed {
                model: model_name.to_string(),
                reason: format!("weight load failed: {e}"),
            }
        })?;

        let eos_token_id = tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .or_else(|| tokenizer.token_to_id("<|eot_id|>"))
            .unwrap_or(2);

        info!(model = model_name, eos_token_id, "Model loaded");

        Ok(Self {
            model_name: model_name.to_string(),
            tokenizer: Arc::new(tokenizer),
            model: Mutex::new(model),
            device,
            eos_token_id,
        })
    }
}

impl Generator for CandleGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn tokenizer(&self) -> Option<Arc<Tokenizer>> {
        Some(self.tokenizer.clone())
    }

    /// Tokenize, sample token-by-token until EOS or the limit, decode.
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerationOutput, ModelError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| ModelError::Generation(format!("tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids();
        let prompt_token_count = prompt_tokens.len() as u32;

        debug!(
            prompt_tokens = prompt_token_count,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            "Starting generation"
        );

        let mut model = self
            .model
            .lock()
            .map_err(|_| ModelError::Generation("model lock poisoned".into()))?;

        let mut logits_processor = if params.temperature <= 0.0 {
            LogitsProcessor::new(42, None, None)
        } else {
            LogitsProcessor::new(42, Some(params.temperature as f64), None)
        };

        let mut next_input = Tensor::new(prompt_tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(map_candle_err)?;
        let mut generated: Vec<u32> = Vec::new();

        for _ in 0..params.max_tokens {
            let logits = model
                .forward(&next_input, generated.len())
                .map_err(map_candle_err)?;
            let logits = logits.squeeze(0).map_err(map_candle_err)?;
            let last = logits.dim(0).map_err(map_candle_err)? - 1;
            let logits = logits.get(last).map_err(map_candle_err)?;

            let next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);

            next_input = Tensor::new(&[next_token][..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(map_candle_err)?;
        }

        let completion_token_count = generated.len() as u32;
        let output = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| ModelError::Generation(format!("detokenization failed: {e}")))?;

        debug!(
            completion_tokens = completion_token_count,
            output_len = output.len(),
            "Generation complete"
        );

        Ok(GenerationOutput {
            text: clean_output(&output),
            prompt_tokens: prompt_token_count,
            completion_tokens: completion_token_count,
        })
    }
}

/// Strip trailing special tokens the decoder sometimes leaves behind.
fn clean_output(raw: &str) -> String {
    raw.trim()
        .trim_end_matches("</s>")
        .trim_end_matches("<|im_end|>")
        .trim_end_matches("<|eot_id|>")
        .trim()
        .to_string()
}

fn map_candle_err(e: candle_core::Error) -> ModelError {
    ModelError::Generation(format!("candle inference error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_preset_aliases() {
        assert!(resolve_preset("tinyllama").is_some());
        assert!(resolve_preset("TinyLlama").is_some());
        assert!(resolve_preset("smollm:135m").is_some());
        assert!(resolve_preset("phi2").is_some());
        assert!(resolve_preset("qwen:0.5b").is_some());
        assert!(resolve_preset("nonexistent").is_none());
    }

    #[test]
    fn presets_list_matches_resolver() {
        for alias in available_presets() {
            assert!(resolve_preset(alias).is_some(), "{alias} must resolve");
        }
    }

    #[test]
    fn clean_output_strips_trailing_special_tokens() {
        assert_eq!(clean_output("Hello there.</s>"), "Hello there.");
        assert_eq!(clean_output("  Sure thing. <|im_end|>"), "Sure thing.");
        assert_eq!(clean_output("Plain answer"), "Plain answer");
    }
}
