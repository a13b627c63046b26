// Fine-tuning job: the linear sequence from dataset file to saved adapter

use std::path::{Path, PathBuf};

use crate::config::{HubConfig, TrainingConfig};
use crate::dataset::load_feedback_dataset;
use crate::errors::{Error, Result};
use crate::metrics::compute_adoption_rate;
use crate::models::{AdapterTrainer, TrainingReport};

/// Everything one run needs, fixed before any work starts
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub dataset: PathBuf,
    /// Local model directory or HuggingFace Hub repository id
    pub model: String,
    pub training: TrainingConfig,
    pub hub: HubConfig,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub records: usize,
    pub adoption_rate: f64,
    pub report: TrainingReport,
}

/// Create the output directory if needed and prove it is writable
pub fn prepare_output_dir(path: &Path) -> Result<()> {
    let io_err = |source: std::io::Error| Error::OutputDirectory {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(path).map_err(io_err)?;

    let probe = path.join(".write-probe");
    std::fs::write(&probe, b"").map_err(io_err)?;
    std::fs::remove_file(&probe).map_err(io_err)?;

    tracing::debug!("Output directory {} is writable", path.display());
    Ok(())
}

/// Run the job.
///
/// `connect` builds the trainer (tokenizer, base model, adapter). It is only
/// called once the dataset has validated and the output directory is ready,
/// so a bad dataset never triggers a model download.
pub fn run<T, F>(job: &Job, connect: F) -> Result<RunOutcome>
where
    T: AdapterTrainer,
    F: FnOnce(&Job) -> Result<T>,
{
    job.training.validate()?;

    let records = load_feedback_dataset(&job.dataset)?;
    prepare_output_dir(&job.training.output_dir)?;

    let mut trainer = connect(job)?;
    let report = trainer.train(&records, &job.training)?;

    tracing::info!(
        "Trained {} steps on {} examples ({} skipped); adapter in {}",
        report.steps,
        report.examples,
        report.skipped,
        report.adapter_dir.display()
    );

    // Reported only; the rate does not influence training.
    let adoption_rate = compute_adoption_rate(&records);

    Ok(RunOutcome {
        records: records.len(),
        adoption_rate,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_nested_directory() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("runs").join("adapter");
        prepare_output_dir(&out).unwrap();

        assert!(out.is_dir());
        assert!(!out.join(".write-probe").exists());
    }

    #[test]
    fn test_prepare_existing_directory_is_fine() {
        let root = tempfile::tempdir().unwrap();
        prepare_output_dir(root.path()).unwrap();
        prepare_output_dir(root.path()).unwrap();
    }

    #[test]
    fn test_prepare_fails_when_path_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = prepare_output_dir(&file).unwrap_err();
        assert!(matches!(err, Error::OutputDirectory { .. }));
    }
}
