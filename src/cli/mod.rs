// CLI module
// Argument parsing and the top-level run sequence for the binary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::config::{load_file_config, DeviceChoice, FileConfig, TrainingConfig, TrainingOverrides};
use crate::metrics::format_adoption_rate;
use crate::models::LoraTrainer;
use crate::pipeline::{self, Job};

#[derive(Debug, Parser)]
#[command(name = "feedback-lora")]
#[command(
    about = "Fine-tune a causal language model with LoRA from prompt/completion feedback",
    long_about = None
)]
pub struct Cli {
    /// Path to curated feedback dataset (JSON array of {prompt, completion, adopted})
    pub dataset: PathBuf,

    /// Base model: local directory or HuggingFace Hub id (e.g. Qwen/Qwen2.5-0.5B)
    pub model: String,

    /// Directory to save the LoRA adapter and checkpoints
    pub output: PathBuf,

    /// Examples per optimizer step [default: 2]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Passes over the dataset [default: 1]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Log the loss every N steps [default: 10]
    #[arg(long)]
    pub logging_steps: Option<usize>,

    /// Write a checkpoint every N steps, 0 to disable [default: 50]
    #[arg(long)]
    pub save_steps: Option<usize>,

    /// Peak learning rate [default: 5e-5]
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Maximum prompt + completion tokens per example [default: 512]
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// Shuffle seed [default: 42]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Compute device [default: auto]
    #[arg(long, value_enum)]
    pub device: Option<DeviceChoice>,

    /// Config file (default: <config dir>/feedback-lora/config.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HuggingFace token for gated or private models
    #[arg(long)]
    pub hf_token: Option<String>,
}

impl Cli {
    fn overrides(&self) -> TrainingOverrides {
        TrainingOverrides {
            batch_size: self.batch_size,
            epochs: self.epochs,
            logging_steps: self.logging_steps,
            save_steps: self.save_steps,
            learning_rate: self.learning_rate,
            max_seq_length: self.max_seq_length,
            seed: self.seed,
            device: self.device,
        }
    }

    /// Layer defaults, then the config file, then flags
    pub fn into_job(self, file: FileConfig) -> Job {
        let mut training = TrainingConfig::new(self.output.clone());
        file.training.apply_to(&mut training);
        self.overrides().apply_to(&mut training);

        let mut hub = file.hub;
        if self.hf_token.is_some() {
            hub.token = self.hf_token;
        }

        Job {
            dataset: self.dataset,
            model: self.model,
            training,
            hub,
        }
    }
}

/// Parse arguments, run the job and print the adoption-rate line
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let file = load_file_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let job = cli.into_job(file);

    tracing::debug!("Job: {:?}", job.training);

    let outcome = pipeline::run(&job, |job| {
        LoraTrainer::from_pretrained(&job.model, &job.hub, &job.training)
    })?;

    println!("{}", format_adoption_rate(outcome.adoption_rate));
    Ok(())
}
