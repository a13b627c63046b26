// feedback-lora - LoRA fine-tuning from prompt/completion feedback
// Library exports

pub mod cli;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod pipeline;

pub use dataset::{load_feedback_dataset, FeedbackRecord};
pub use errors::{Error, Result};
pub use metrics::compute_adoption_rate;
