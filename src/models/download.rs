// Model Downloader - resolves a model identifier to tokenizer, config and weight files
// Uses a local directory when one exists, otherwise HuggingFace Hub for download and caching

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::HubConfig;
use crate::errors::{Error, Result};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Files needed to build the tokenizer and base model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// One file, or every shard listed in the safetensors index
    pub weights: Vec<PathBuf>,
}

/// Model downloader with HuggingFace Hub integration
#[derive(Debug, Clone, Default)]
pub struct ModelDownloader {
    token: Option<String>,
    cache_dir: Option<PathBuf>,
}

impl ModelDownloader {
    pub fn new(hub: &HubConfig) -> Self {
        Self {
            token: hub.token.clone(),
            cache_dir: hub.cache_dir.clone(),
        }
    }

    /// Resolve `model` to files on disk.
    ///
    /// An existing directory is used as-is. Anything else is treated as a
    /// Hub repository id (e.g. `Qwen/Qwen2.5-0.5B`) and downloaded into the
    /// hub cache, which is reused on later runs.
    pub fn resolve(&self, model: &str) -> Result<ModelFiles> {
        let local = Path::new(model);
        if local.is_dir() {
            tracing::info!("Using local model directory {}", local.display());
            return from_directory(model, local);
        }
        self.fetch(model)
    }

    fn fetch(&self, model: &str) -> Result<ModelFiles> {
        let mut builder = ApiBuilder::new()
            .with_progress(true)
            .with_token(self.token.clone());
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build().map_err(|e| {
            Error::collaborator(model, format!("HuggingFace Hub unavailable: {}", e))
        })?;
        let repo = api.model(model.to_string());

        tracing::info!("Fetching {} from HuggingFace Hub...", model);

        let config = get_file(&repo, model, CONFIG_FILE)?;
        let tokenizer = get_file(&repo, model, TOKENIZER_FILE)?;

        let weights = match repo.get(SINGLE_WEIGHTS_FILE) {
            Ok(path) => vec![path],
            Err(single_err) => {
                tracing::debug!("No single weights file ({}), trying sharded index", single_err);
                let index = get_file(&repo, model, WEIGHTS_INDEX_FILE)?;
                shard_names(model, &index)?
                    .iter()
                    .map(|shard| get_file(&repo, model, shard))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        tracing::debug!("Resolved {} weight file(s) for {}", weights.len(), model);

        Ok(ModelFiles {
            config,
            tokenizer,
            weights,
        })
    }
}

fn get_file(repo: &ApiRepo, model: &str, file: &str) -> Result<PathBuf> {
    let path = repo
        .get(file)
        .map_err(|e| Error::collaborator(model, format!("failed to fetch {}: {}", file, e)))?;
    tracing::debug!("Fetched {} to {:?}", file, path);
    Ok(path)
}

fn from_directory(model: &str, dir: &Path) -> Result<ModelFiles> {
    let existing = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::collaborator(
                model,
                format!("{} not found in {}", name, dir.display()),
            ))
        }
    };

    let config = existing(CONFIG_FILE)?;
    let tokenizer = existing(TOKENIZER_FILE)?;

    let single = dir.join(SINGLE_WEIGHTS_FILE);
    let weights = if single.is_file() {
        vec![single]
    } else {
        let index = existing(WEIGHTS_INDEX_FILE)?;
        shard_names(model, &index)?
            .iter()
            .map(|shard| existing(shard.as_str()))
            .collect::<Result<Vec<_>>>()?
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

/// Distinct shard file names from a `model.safetensors.index.json`, sorted
fn shard_names(model: &str, index_path: &Path) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct WeightIndex {
        weight_map: std::collections::HashMap<String, String>,
    }

    let contents = std::fs::read_to_string(index_path).map_err(|e| {
        Error::collaborator(model, format!("cannot read {}: {}", index_path.display(), e))
    })?;
    let index: WeightIndex = serde_json::from_str(&contents).map_err(|e| {
        Error::collaborator(model, format!("cannot parse {}: {}", index_path.display(), e))
    })?;

    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    if shards.is_empty() {
        return Err(Error::collaborator(model, "weight index lists no shards"));
    }
    Ok(shards.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"{}").unwrap();
    }

    #[test]
    fn test_local_directory_single_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), CONFIG_FILE);
        touch(dir.path(), TOKENIZER_FILE);
        touch(dir.path(), SINGLE_WEIGHTS_FILE);

        let files = ModelDownloader::default()
            .resolve(dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(files.config, dir.path().join(CONFIG_FILE));
        assert_eq!(files.weights, vec![dir.path().join(SINGLE_WEIGHTS_FILE)]);
    }

    #[test]
    fn test_local_directory_sharded() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), CONFIG_FILE);
        touch(dir.path(), TOKENIZER_FILE);
        touch(dir.path(), "model-00001-of-00002.safetensors");
        touch(dir.path(), "model-00002-of-00002.safetensors");
        fs::write(
            dir.path().join(WEIGHTS_INDEX_FILE),
            r#"{"metadata":{},"weight_map":{
                "a.weight":"model-00002-of-00002.safetensors",
                "b.weight":"model-00001-of-00002.safetensors",
                "c.weight":"model-00001-of-00002.safetensors"}}"#,
        )
        .unwrap();

        let files = ModelDownloader::default()
            .resolve(dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_local_directory_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), CONFIG_FILE);
        touch(dir.path(), SINGLE_WEIGHTS_FILE);

        let err = ModelDownloader::default()
            .resolve(dir.path().to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::CollaboratorLoad { .. }));
        assert!(err.to_string().contains(TOKENIZER_FILE));
    }

    #[test]
    fn test_local_directory_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), CONFIG_FILE);
        touch(dir.path(), TOKENIZER_FILE);

        let err = ModelDownloader::default()
            .resolve(dir.path().to_str().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_INDEX_FILE));
    }

    #[test]
    #[ignore] // Requires network - run with: cargo test -- --ignored
    fn test_fetch_small_model() {
        let files = ModelDownloader::default()
            .resolve("Qwen/Qwen2.5-0.5B")
            .unwrap();
        assert!(files.config.exists());
        assert!(files.tokenizer.exists());
        assert!(!files.weights.is_empty());
    }
}
