// Configuration structs

use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::constants::*;
use crate::errors::{Error, Result};

/// Compute device for the base model and adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// CUDA if compiled in and present, then Metal, then CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceChoice {
    /// Open the candle device for this choice
    pub fn resolve(self) -> Result<Device> {
        let device = match self {
            DeviceChoice::Cpu => Device::Cpu,
            DeviceChoice::Cuda => Device::new_cuda(0)?,
            DeviceChoice::Metal => Device::new_metal(0)?,
            DeviceChoice::Auto => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(0)?
                } else if candle_core::utils::metal_is_available() {
                    Device::new_metal(0)?
                } else {
                    Device::Cpu
                }
            }
        };
        tracing::debug!("Using device {:?} (requested {:?})", device, self);
        Ok(device)
    }
}

/// Immutable settings for one fine-tuning run.
///
/// Built once from defaults, the config file and command-line flags, then
/// passed by reference into the trainer. Nothing reads training settings
/// from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingConfig {
    /// Where adapter files and checkpoints are written
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub epochs: usize,
    pub logging_steps: usize,
    /// 0 disables intermediate checkpoints
    pub save_steps: usize,
    pub learning_rate: f64,
    pub max_seq_length: usize,
    pub seed: u64,
    pub device: DeviceChoice,
}

impl TrainingConfig {
    /// Defaults for everything except the output directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            logging_steps: DEFAULT_LOGGING_STEPS,
            save_steps: DEFAULT_SAVE_STEPS,
            learning_rate: DEFAULT_LEARNING_RATE,
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            seed: DEFAULT_SEED,
            device: DeviceChoice::default(),
        }
    }

    /// Reject values the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::Config("output directory must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".into()));
        }
        if self.logging_steps == 0 {
            return Err(Error::Config("logging steps must be at least 1".into()));
        }
        if self.max_seq_length < 2 {
            return Err(Error::Config(format!(
                "max sequence length must be at least 2, got {}",
                self.max_seq_length
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Config(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Optimizer steps per epoch for a dataset of `examples` usable records
    pub fn steps_per_epoch(&self, examples: usize) -> usize {
        examples.div_ceil(self.batch_size)
    }
}

/// Low-rank adapter settings, written next to the weights as `adapter_config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    pub peft_type: String,
    pub task_type: String,
    #[serde(rename = "r")]
    pub rank: usize,
    #[serde(rename = "lora_alpha")]
    pub alpha: f64,
    #[serde(rename = "lora_dropout")]
    pub dropout: f32,
    pub target_modules: Vec<String>,
    /// Model identifier the adapter was trained against
    #[serde(rename = "base_model_name_or_path", default)]
    pub base_model: String,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            peft_type: "LORA".to_string(),
            task_type: "CAUSAL_LM".to_string(),
            rank: LORA_RANK,
            alpha: LORA_ALPHA,
            dropout: LORA_DROPOUT,
            target_modules: vec![LORA_TARGET_MODULE.to_string()],
            base_model: String::new(),
        }
    }
}

impl LoraConfig {
    pub fn for_model(base_model: impl Into<String>) -> Self {
        Self {
            base_model: base_model.into(),
            ..Self::default()
        }
    }

    /// alpha / rank
    pub fn scaling(&self) -> f64 {
        self.alpha / self.rank as f64
    }
}
