// Base model loader - frozen causal LM and tokenizer built with Candle
//
// The base weights are memory-mapped as plain tensors, never as variables,
// so gradients only ever reach the adapter.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::qwen2;
use tokenizers::Tokenizer;

use super::download::ModelFiles;
use crate::errors::{Error, Result};

/// End-of-sequence spellings across the tokenizers we load, most specific first
const EOS_CANDIDATES: &[&str] = &["<|endoftext|>", "<|im_end|>", "</s>", "<eos>"];

/// A causal LM whose weights stay fixed during fine-tuning
pub trait FrozenLm {
    fn device(&self) -> &Device;

    /// Width of the final hidden state
    fn hidden_size(&self) -> usize;

    /// Number of output logits per position
    fn vocab_size(&self) -> usize;

    /// Final (normalized) hidden states for one sequence, shape `[seq_len, hidden]`
    fn hidden_states(&mut self, input_ids: &[u32]) -> Result<Tensor>;

    /// Output projection `[n, hidden] -> [n, vocab]`
    fn project(&self, hidden: &Tensor) -> Result<Tensor>;
}

/// Qwen2-family model loaded from safetensors
pub struct Qwen2Lm {
    model: qwen2::Model,
    lm_head: Linear,
    config: qwen2::Config,
    device: Device,
}

impl std::fmt::Debug for Qwen2Lm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Qwen2Lm")
            .field("hidden_size", &self.config.hidden_size)
            .field("vocab_size", &self.config.vocab_size)
            .field("layers", &self.config.num_hidden_layers)
            .field("device", &self.device)
            .finish()
    }
}

impl Qwen2Lm {
    /// Build the model from resolved files
    pub fn load(model_id: &str, files: &ModelFiles, device: &Device) -> Result<Self> {
        tracing::info!("Loading base model {} with Candle", model_id);

        let config_str = std::fs::read_to_string(&files.config).map_err(|e| {
            Error::collaborator(model_id, format!("failed to read config.json: {}", e))
        })?;
        let config: qwen2::Config = serde_json::from_str(&config_str).map_err(|e| {
            Error::collaborator(model_id, format!("failed to parse config.json: {}", e))
        })?;

        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files.weights, DType::F32, device).map_err(|e| {
                Error::collaborator(model_id, format!("failed to load weights: {}", e))
            })?
        };

        let model = qwen2::Model::new(&config, vb.clone())
            .map_err(|e| Error::collaborator(model_id, format!("failed to build model: {}", e)))?;

        // Untied checkpoints ship their own head; tied ones reuse the embedding matrix.
        let head_weight = if vb.contains_tensor("lm_head.weight") {
            vb.pp("lm_head")
                .get((config.vocab_size, config.hidden_size), "weight")
        } else {
            vb.pp("model.embed_tokens")
                .get((config.vocab_size, config.hidden_size), "weight")
        }
        .map_err(|e| Error::collaborator(model_id, format!("failed to load output head: {}", e)))?;

        tracing::debug!(
            "Base model ready: {} layers, hidden {}, vocab {}",
            config.num_hidden_layers,
            config.hidden_size,
            config.vocab_size
        );

        Ok(Self {
            model,
            lm_head: Linear::new(head_weight, None),
            config,
            device: device.clone(),
        })
    }
}

impl FrozenLm for Qwen2Lm {
    fn device(&self) -> &Device {
        &self.device
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn hidden_states(&mut self, input_ids: &[u32]) -> Result<Tensor> {
        // Every example is a fresh sequence at offset 0
        self.model.clear_kv_cache();
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let hidden = self.model.forward(&input, 0, None)?;
        Ok(hidden.squeeze(0)?)
    }

    fn project(&self, hidden: &Tensor) -> Result<Tensor> {
        Ok(self.lm_head.forward(hidden)?)
    }
}

/// Load `tokenizer.json`
pub fn load_tokenizer(model_id: &str, files: &ModelFiles) -> Result<Tokenizer> {
    Tokenizer::from_file(&files.tokenizer)
        .map_err(|e| Error::collaborator(model_id, format!("failed to load tokenizer: {}", e)))
}

/// Id of the tokenizer's end-of-sequence token, if it has a recognizable one
pub fn eos_token_id(tokenizer: &Tokenizer) -> Option<u32> {
    EOS_CANDIDATES
        .iter()
        .find_map(|token| tokenizer.token_to_id(token))
}
