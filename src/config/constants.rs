// Project-wide constants
//
// Centralised here so training defaults and file names have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Examples per optimizer step.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Full passes over the dataset.
pub const DEFAULT_EPOCHS: usize = 1;

/// Log the running loss every N optimizer steps.
pub const DEFAULT_LOGGING_STEPS: usize = 10;

/// Write a `checkpoint-<step>` directory every N optimizer steps (0 disables).
pub const DEFAULT_SAVE_STEPS: usize = 50;

/// Peak AdamW learning rate; decays linearly to zero over the run.
pub const DEFAULT_LEARNING_RATE: f64 = 5e-5;

/// Prompt + completion tokens kept per example; longer sequences are truncated.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 512;

/// Seed for the per-epoch shuffle.
pub const DEFAULT_SEED: u64 = 42;

/// LoRA rank.
pub const LORA_RANK: usize = 16;

/// LoRA scaling numerator (scaling = alpha / rank).
pub const LORA_ALPHA: f64 = 32.0;

/// Dropout applied to the adapter input during training.
pub const LORA_DROPOUT: f32 = 0.05;

/// Module the adapter is attached to.
pub const LORA_TARGET_MODULE: &str = "lm_head";

/// Adapter weight file inside the output directory.
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

/// Adapter config file inside the output directory.
pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// Loss history and step counters inside the output directory.
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

/// Directory under the platform config dir holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = "feedback-lora";
