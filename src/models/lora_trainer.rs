// LoRA Trainer - training loop over tokenized feedback records

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use super::download::ModelDownloader;
use super::loader::{eos_token_id, load_tokenizer, FrozenLm, Qwen2Lm};
use super::lora_impl::LoraAdapter;
use crate::config::constants::TRAINER_STATE_FILE;
use crate::config::{HubConfig, LoraConfig, TrainingConfig};
use crate::dataset::FeedbackRecord;
use crate::errors::{Error, Result};

/// Anything that can fine-tune on validated records and leave adapter files
/// in `config.output_dir`.
pub trait AdapterTrainer {
    fn train(
        &mut self,
        records: &[FeedbackRecord],
        config: &TrainingConfig,
    ) -> Result<TrainingReport>;
}

/// One tokenized training sequence: prompt tokens then completion tokens.
/// Loss is taken on positions `label_start..input_ids.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub input_ids: Vec<u32>,
    pub label_start: usize,
}

impl EncodedExample {
    /// Number of supervised tokens
    pub fn label_count(&self) -> usize {
        self.input_ids.len() - self.label_start
    }
}

/// Loss snapshot written every `logging_steps` steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: usize,
    pub epoch: f64,
    pub loss: f64,
    pub learning_rate: f64,
}

/// Contents of `trainer_state.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub global_step: usize,
    pub max_steps: usize,
    pub epoch: f64,
    pub log_history: Vec<LogEntry>,
    pub dataset_fingerprint: String,
    pub saved_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub steps: usize,
    pub examples: usize,
    /// Records dropped because truncation left no completion tokens
    pub skipped: usize,
    pub final_loss: Option<f64>,
    pub history: Vec<LogEntry>,
    pub adapter_dir: PathBuf,
}

/// Tokenize one record.
///
/// Returns `None` when truncation to `max_seq_length` leaves no completion
/// token to learn from.
pub fn encode_example(
    tokenizer: &Tokenizer,
    eos_token: Option<u32>,
    record: &FeedbackRecord,
    max_seq_length: usize,
) -> Result<Option<EncodedExample>> {
    let prompt = tokenizer
        .encode(record.prompt.as_str(), true)
        .map_err(|e| Error::Training(format!("tokenization failed: {}", e)))?;
    let completion = tokenizer
        .encode(record.completion.as_str(), false)
        .map_err(|e| Error::Training(format!("tokenization failed: {}", e)))?;

    let mut input_ids = prompt.get_ids().to_vec();
    // The first token has no predecessor to predict it from
    let label_start = input_ids.len().max(1);
    input_ids.extend_from_slice(completion.get_ids());
    input_ids.extend(eos_token);
    input_ids.truncate(max_seq_length);

    if input_ids.len() <= label_start {
        return Ok(None);
    }

    Ok(Some(EncodedExample {
        input_ids,
        label_start,
    }))
}

/// Stable hash of the record contents, stored with checkpoints
pub fn dataset_fingerprint(records: &[FeedbackRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.completion.as_bytes());
        hasher.update([0u8, record.adopted as u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// LoRA trainer: frozen base model, tokenizer and the adapter being trained
pub struct LoraTrainer<M: FrozenLm> {
    model: M,
    tokenizer: Tokenizer,
    eos_token: Option<u32>,
    adapter: LoraAdapter,
}

impl LoraTrainer<Qwen2Lm> {
    /// Retrieve tokenizer and base model for `model_id`, then attach a fresh adapter
    pub fn from_pretrained(
        model_id: &str,
        hub: &HubConfig,
        config: &TrainingConfig,
    ) -> Result<Self> {
        let files = ModelDownloader::new(hub).resolve(model_id)?;
        let tokenizer = load_tokenizer(model_id, &files)?;
        let device = config
            .device
            .resolve()
            .map_err(|e| Error::collaborator(model_id, format!("device unavailable: {}", e)))?;
        let model = Qwen2Lm::load(model_id, &files, &device)?;
        Self::new(model, tokenizer, LoraConfig::for_model(model_id))
    }
}

impl<M: FrozenLm> LoraTrainer<M> {
    pub fn new(model: M, tokenizer: Tokenizer, lora: LoraConfig) -> Result<Self> {
        let adapter = LoraAdapter::new(
            lora,
            model.hidden_size(),
            model.vocab_size(),
            model.device().clone(),
        )?;
        tracing::info!(
            "LoRA adapter: rank {}, alpha {}, dropout {}, {} trainable parameters",
            adapter.config().rank,
            adapter.config().alpha,
            adapter.config().dropout,
            adapter.num_parameters()
        );

        Ok(Self {
            eos_token: eos_token_id(&tokenizer),
            model,
            tokenizer,
            adapter,
        })
    }

    pub fn adapter(&self) -> &LoraAdapter {
        &self.adapter
    }

    /// Tokenize every record; returns the usable examples and the skip count
    pub fn encode_all(
        &self,
        records: &[FeedbackRecord],
        max_seq_length: usize,
    ) -> Result<(Vec<EncodedExample>, usize)> {
        let mut examples = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for (index, record) in records.iter().enumerate() {
            match encode_example(&self.tokenizer, self.eos_token, record, max_seq_length)? {
                Some(example) => examples.push(example),
                None => {
                    tracing::warn!(
                        "Skipping record {}: no completion tokens left within {} tokens",
                        index,
                        max_seq_length
                    );
                    skipped += 1;
                }
            }
        }

        Ok((examples, skipped))
    }
}

impl<M: FrozenLm> AdapterTrainer for LoraTrainer<M> {
    fn train(
        &mut self,
        records: &[FeedbackRecord],
        config: &TrainingConfig,
    ) -> Result<TrainingReport> {
        let (examples, skipped) = self.encode_all(records, config.max_seq_length)?;
        let fingerprint = dataset_fingerprint(records);

        let mut report = fit(&mut self.model, &self.adapter, &examples, config, &fingerprint)?;
        report.skipped = skipped;
        Ok(report)
    }
}

/// Run the optimization loop and write the final adapter into `config.output_dir`
pub fn fit<M: FrozenLm>(
    model: &mut M,
    adapter: &LoraAdapter,
    examples: &[EncodedExample],
    config: &TrainingConfig,
    fingerprint: &str,
) -> Result<TrainingReport> {
    if examples.is_empty() {
        return Err(Error::Training("no usable training examples".to_string()));
    }

    let steps_per_epoch = config.steps_per_epoch(examples.len());
    let max_steps = steps_per_epoch * config.epochs;

    tracing::info!(
        "Starting LoRA training on {} examples: {} epoch(s), batch size {}, {} steps",
        examples.len(),
        config.epochs,
        config.batch_size,
        max_steps
    );

    let mut optimizer = AdamW::new(
        adapter.trainable_vars(),
        ParamsAdamW {
            lr: config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )?;

    let progress = ProgressBar::new(max_steps as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..examples.len()).collect();
    let mut history = Vec::new();
    let mut global_step = 0;
    let mut window_loss = 0.0;
    let mut window_steps = 0;
    let mut last_loss = None;

    for epoch in 0..config.epochs {
        tracing::debug!("Epoch {}/{}", epoch + 1, config.epochs);
        order.shuffle(&mut rng);

        for batch in order.chunks(config.batch_size) {
            // Linear decay to zero over the whole run
            let learning_rate =
                config.learning_rate * (max_steps - global_step) as f64 / max_steps as f64;
            optimizer.set_learning_rate(learning_rate);

            let losses = batch
                .iter()
                .map(|&i| example_loss(model, adapter, &examples[i]))
                .collect::<Result<Vec<_>>>()?;
            let loss = Tensor::stack(&losses, 0)?.mean_all()?;
            optimizer.backward_step(&loss)?;

            let loss_value = loss.to_scalar::<f32>()? as f64;
            if !loss_value.is_finite() {
                return Err(Error::Training(format!(
                    "loss diverged at step {}",
                    global_step + 1
                )));
            }

            global_step += 1;
            window_loss += loss_value;
            window_steps += 1;
            last_loss = Some(loss_value);
            progress.inc(1);
            progress.set_message(format!("loss {:.4}", loss_value));

            if global_step % config.logging_steps == 0 {
                let entry = LogEntry {
                    step: global_step,
                    epoch: global_step as f64 / steps_per_epoch as f64,
                    loss: window_loss / window_steps as f64,
                    learning_rate,
                };
                tracing::info!(
                    "Step {}/{} (epoch {:.2}): loss {:.4}, lr {:.2e}",
                    entry.step,
                    max_steps,
                    entry.epoch,
                    entry.loss,
                    entry.learning_rate
                );
                history.push(entry);
                window_loss = 0.0;
                window_steps = 0;
            }

            if config.save_steps > 0 && global_step % config.save_steps == 0 {
                let dir = config.output_dir.join(format!("checkpoint-{}", global_step));
                std::fs::create_dir_all(&dir).map_err(|source| Error::OutputDirectory {
                    path: dir.clone(),
                    source,
                })?;
                let state =
                    trainer_state(global_step, max_steps, steps_per_epoch, &history, fingerprint);
                save_checkpoint(adapter, &state, &dir)?;
                tracing::info!("Saved checkpoint {}", dir.display());
            }
        }
    }

    progress.finish_with_message("training complete");

    let state = trainer_state(global_step, max_steps, steps_per_epoch, &history, fingerprint);
    save_checkpoint(adapter, &state, &config.output_dir)?;

    tracing::info!(
        "Training complete. Final loss: {:.4}",
        last_loss.unwrap_or(0.0)
    );

    Ok(TrainingReport {
        steps: global_step,
        examples: examples.len(),
        skipped: 0,
        final_loss: last_loss,
        history,
        adapter_dir: config.output_dir.clone(),
    })
}

/// Mean cross-entropy over the completion tokens of one example
fn example_loss<M: FrozenLm>(
    model: &mut M,
    adapter: &LoraAdapter,
    example: &EncodedExample,
) -> Result<Tensor> {
    let hidden = model.hidden_states(&example.input_ids)?;
    // Position t predicts token t + 1
    let hidden = hidden.narrow(0, example.label_start - 1, example.label_count())?;
    let base_logits = model.project(&hidden)?;
    let logits = adapter.forward(&hidden, &base_logits, true)?;
    let targets = Tensor::new(&example.input_ids[example.label_start..], model.device())?;
    Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
}

fn trainer_state(
    global_step: usize,
    max_steps: usize,
    steps_per_epoch: usize,
    history: &[LogEntry],
    fingerprint: &str,
) -> TrainerState {
    TrainerState {
        global_step,
        max_steps,
        epoch: global_step as f64 / steps_per_epoch as f64,
        log_history: history.to_vec(),
        dataset_fingerprint: fingerprint.to_string(),
        saved_at: chrono::Utc::now(),
    }
}

fn save_checkpoint(adapter: &LoraAdapter, state: &TrainerState, dir: &Path) -> Result<()> {
    adapter.save(dir)?;

    let state_path = dir.join(TRAINER_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::Training(format!("cannot serialize trainer state: {}", e)))?;
    std::fs::write(&state_path, json).map_err(|source| Error::OutputDirectory {
        path: state_path.clone(),
        source,
    })
}
