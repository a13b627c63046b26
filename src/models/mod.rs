// Models: retrieval, frozen base model, LoRA adapter and training loop

pub mod download;
pub mod loader;
pub mod lora_impl;
pub mod lora_trainer;

pub use download::{ModelDownloader, ModelFiles};
pub use loader::{FrozenLm, Qwen2Lm};
pub use lora_impl::{LoraAdapter, LoraLayer};
pub use lora_trainer::{
    dataset_fingerprint, encode_example, fit, AdapterTrainer, EncodedExample, LogEntry,
    LoraTrainer, TrainerState, TrainingReport,
};
