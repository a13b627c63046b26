// LoRA (Low-Rank Adaptation) Implementation
// Trainable low-rank pair on top of the frozen output projection

use candle_core::{DType, Device, Module, ModuleT, Tensor, Var};
use candle_nn::{Dropout, Linear, VarBuilder, VarMap};
use std::path::Path;

use crate::config::constants::{ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE};
use crate::config::LoraConfig;
use crate::errors::{Error, Result};

/// Variable prefix, matching how PEFT names an adapter on `lm_head`
const ADAPTER_PREFIX: &str = "base_model.model.lm_head";

/// Low-rank matrices for a single layer
#[derive(Debug, Clone)]
pub struct LoraLayer {
    /// A matrix: rank × input_dim
    lora_a: Linear,
    /// B matrix: output_dim × rank
    lora_b: Linear,
    dropout: Dropout,
    /// alpha / rank
    scaling: f64,
}

impl LoraLayer {
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        config: &LoraConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        // A: Kaiming-normal initialization
        let a = vb.pp("lora_A").get_with_hints(
            (config.rank, input_dim),
            "weight",
            candle_nn::init::DEFAULT_KAIMING_NORMAL,
        )?;

        // B: Zero initialization (starts with no effect)
        let b = vb
            .pp("lora_B")
            .get_with_hints((output_dim, config.rank), "weight", candle_nn::Init::Const(0.0))?;

        Ok(Self {
            lora_a: Linear::new(a, None),
            lora_b: Linear::new(b, None),
            dropout: Dropout::new(config.dropout),
            scaling: config.scaling(),
        })
    }

    /// output = base_output + B(A(dropout(input))) * scaling
    pub fn forward(&self, input: &Tensor, base_output: &Tensor, train: bool) -> Result<Tensor> {
        let input = self.dropout.forward_t(input, train)?;
        let lora_out = self.lora_b.forward(&self.lora_a.forward(&input)?)?;
        Ok((base_output + (lora_out * self.scaling)?)?)
    }
}

/// Adapter attached to the output projection of a frozen model
pub struct LoraAdapter {
    layer: LoraLayer,
    config: LoraConfig,
    /// Variable map for all trainable parameters
    varmap: VarMap,
    device: Device,
}

impl std::fmt::Debug for LoraAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoraAdapter")
            .field("config", &self.config)
            .field("device", &self.device)
            .field("varmap", &"<VarMap>")
            .finish()
    }
}

impl LoraAdapter {
    /// Fresh adapter for a `[hidden] -> [vocab]` projection
    pub fn new(
        config: LoraConfig,
        hidden_size: usize,
        vocab_size: usize,
        device: Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = LoraLayer::new(hidden_size, vocab_size, &config, vb.pp(ADAPTER_PREFIX))?;

        Ok(Self {
            layer,
            config,
            varmap,
            device,
        })
    }

    /// Add the low-rank update to the frozen projection's output
    pub fn forward(&self, hidden: &Tensor, base_logits: &Tensor, train: bool) -> Result<Tensor> {
        self.layer.forward(hidden, base_logits, train)
    }

    pub fn config(&self) -> &LoraConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Parameters the optimizer updates
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn num_parameters(&self) -> usize {
        self.trainable_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Write `adapter_model.safetensors` and `adapter_config.json` into `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        let weights_path = dir.join(ADAPTER_WEIGHTS_FILE);
        self.varmap.save(&weights_path)?;

        let config_path = dir.join(ADAPTER_CONFIG_FILE);
        let config_json = serde_json::to_string_pretty(&self.config)
            .map_err(|e| Error::Training(format!("cannot serialize adapter config: {}", e)))?;
        std::fs::write(&config_path, config_json).map_err(|source| Error::OutputDirectory {
            path: config_path.clone(),
            source,
        })?;

        tracing::info!("Saved LoRA adapter to {}", dir.display());
        Ok(())
    }

    /// Load an adapter previously written by [`LoraAdapter::save`]
    pub fn load(dir: &Path, hidden_size: usize, vocab_size: usize, device: Device) -> Result<Self> {
        let config_path = dir.join(ADAPTER_CONFIG_FILE);
        let config_json = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", config_path.display(), e))
        })?;
        let config: LoraConfig = serde_json::from_str(&config_json).map_err(|e| {
            Error::Config(format!("cannot parse {}: {}", config_path.display(), e))
        })?;

        let mut adapter = Self::new(config, hidden_size, vocab_size, device)?;
        adapter.varmap.load(dir.join(ADAPTER_WEIGHTS_FILE))?;

        tracing::info!("Loaded LoRA adapter from {}", dir.display());
        Ok(adapter)
    }
}
