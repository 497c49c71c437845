use crate::error::{TrainingError, TrainingResult};
use std::path::{Component, Path, PathBuf};

/// File name of the per-epoch metrics table the trainer writes into a run directory.
pub const METRICS_FILE: &str = "results.csv";

/// Stem of the checkpoint the trainer refreshes after every epoch.
pub const RESUME_CHECKPOINT_STEM: &str = "last";

/// Filesystem roots used by the panel.
///
/// Default layout under a base directory:
/// `static/uploads`, `static/results`, `datasets`, `runs`.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    base_dir: PathBuf,
    uploads: PathBuf,
    results: PathBuf,
    datasets: PathBuf,
    runs: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(base_dir: PathBuf, uploads: PathBuf, results: PathBuf, datasets: PathBuf, runs: PathBuf) -> Self {
        Self { base_dir, uploads, results, datasets, runs }
    }

    #[must_use]
    pub fn for_base_dir(base_dir: &Path) -> Self {
        Self::new(
            base_dir.to_path_buf(),
            base_dir.join("static").join("uploads"),
            base_dir.join("static").join("results"),
            base_dir.join("datasets"),
            base_dir.join("runs"),
        )
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.results
    }

    #[must_use]
    pub fn datasets_dir(&self) -> &Path {
        &self.datasets
    }

    #[must_use]
    pub fn runs_dir(&self) -> &Path {
        &self.runs
    }

    #[must_use]
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.uploads.join(file_name)
    }

    #[must_use]
    pub fn dataset_dir(&self, dataset_name: &str) -> PathBuf {
        self.datasets.join(dataset_name)
    }

    #[must_use]
    pub fn run_dir(&self, job_name: &str) -> PathBuf {
        self.runs.join(job_name)
    }

    #[must_use]
    pub fn weights_dir(&self, job_name: &str) -> PathBuf {
        self.run_dir(job_name).join("weights")
    }

    #[must_use]
    pub fn metrics_path(&self, job_name: &str) -> PathBuf {
        self.run_dir(job_name).join(METRICS_FILE)
    }

    /// Locate `<runs>/<job>/weights/last.*`, preferring `last.pt`.
    pub fn find_resume_checkpoint(&self, job_name: &str) -> Option<PathBuf> {
        let weights = self.weights_dir(job_name);
        let preferred = weights.join(format!("{RESUME_CHECKPOINT_STEM}.pt"));
        if preferred.is_file() {
            return Some(preferred);
        }

        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&weights)
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.file_stem().and_then(|s| s.to_str()) == Some(RESUME_CHECKPOINT_STEM)
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        for dir in [&self.uploads, &self.results, &self.datasets, &self.runs] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Reject names that would escape the directory they are joined onto.
pub fn validate_path_component(kind: &str, name: &str) -> TrainingResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TrainingError::Validation(format!("{kind} is required")));
    }
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TrainingError::Validation(format!("{kind} must be a plain name: {name}"))),
    }
}
