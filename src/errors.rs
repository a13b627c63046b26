// Error types for dataset loading, configuration, model retrieval and training

use std::path::PathBuf;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the fine-tuning job can hit. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dataset file missing or unreadable
    #[error("Failed to read dataset {}: {source}", path.display())]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dataset is not JSON, not an array, or holds an invalid record
    #[error("Invalid dataset {}: {}", path.display(), describe_format(*index, reason))]
    DatasetFormat {
        path: PathBuf,
        /// Offending record index, when the failure is tied to one record
        index: Option<usize>,
        reason: String,
    },

    /// Tokenizer or base model could not be retrieved or built
    #[error("Failed to load model '{model}': {reason}")]
    CollaboratorLoad { model: String, reason: String },

    /// Output directory cannot be created or written to
    #[error("Output directory {} is not usable: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value or config file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Training loop failure outside the tensor library
    #[error("Training failed: {0}")]
    Training(String),

    /// Tensor library failure during adapter construction or training
    #[error("Tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),
}

fn describe_format(index: Option<usize>, reason: &str) -> String {
    match index {
        Some(index) => format!("record {}: {}", index, reason),
        None => reason.to_string(),
    }
}

impl Error {
    pub(crate) fn collaborator(model: &str, reason: impl std::fmt::Display) -> Self {
        Error::CollaboratorLoad {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Record index for dataset format errors tied to a single record
    pub fn record_index(&self) -> Option<usize> {
        match self {
            Error::DatasetFormat { index, .. } => *index,
            _ => None,
        }
    }
}
