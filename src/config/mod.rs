// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{default_config_path, load_file_config, FileConfig, HubConfig, TrainingOverrides};
pub use settings::{DeviceChoice, LoraConfig, TrainingConfig};
