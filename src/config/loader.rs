// Configuration loader
// Reads optional training defaults from a TOML file and layers CLI flags on top

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_DIR_NAME;
use super::settings::{DeviceChoice, TrainingConfig};
use crate::errors::{Error, Result};

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub hub: HubConfig,
}

/// Training values that replace the built-in defaults when set
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub batch_size: Option<usize>,
    pub epochs: Option<usize>,
    pub logging_steps: Option<usize>,
    pub save_steps: Option<usize>,
    pub learning_rate: Option<f64>,
    pub max_seq_length: Option<usize>,
    pub seed: Option<u64>,
    pub device: Option<DeviceChoice>,
}

impl TrainingOverrides {
    /// Apply every value that is set; later layers win
    pub fn apply_to(&self, config: &mut TrainingConfig) {
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.logging_steps {
            config.logging_steps = v;
        }
        if let Some(v) = self.save_steps {
            config.save_steps = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.max_seq_length {
            config.max_seq_length = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.device {
            config.device = v;
        }
    }
}

/// HuggingFace Hub access
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    /// API token for gated or private models
    pub token: Option<String>,
    /// Overrides the default hub cache (~/.cache/huggingface/hub)
    pub cache_dir: Option<PathBuf>,
}

/// `<config dir>/feedback-lora/config.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.toml"))
}

/// Load the config file.
///
/// An explicit path must exist. Without one, the default location is tried
/// and a missing file yields the empty config.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(FileConfig::default()),
        },
    };

    let contents = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let config: FileConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
