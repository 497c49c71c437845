use crate::error::{TrainingError, TrainingResult};
use crate::layout::validate_path_component;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Augmentation keys forwarded to the trainer on a fresh start, in argument order.
pub const AUGMENTATION_OPTIONS: [&str; 9] =
    ["degrees", "translate", "scale", "shear", "perspective", "flipud", "fliplr", "mosaic", "mixup"];

/// System keys forwarded to the trainer on a fresh start, in argument order.
pub const SYSTEM_OPTIONS: [&str; 5] = ["device", "workers", "patience", "optimizer", "cos_lr"];

const RESUME_OPTION: &str = "resume";

/// An uploaded dataset archive.
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    /// Name declared by the client, e.g. `coco_subset.zip`.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl DatasetUpload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), bytes }
    }

    /// The final path component of the declared name.
    pub fn safe_file_name(&self) -> TrainingResult<String> {
        let name = Path::new(self.file_name.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrainingError::Validation(format!("invalid dataset file name: {}", self.file_name)))?;
        Ok(name.to_string())
    }

    /// Directory name the archive is extracted into.
    pub fn dataset_name(&self) -> TrainingResult<String> {
        let file_name = self.safe_file_name()?;
        let stem = Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name.as_str())
            .to_string();
        validate_path_component("dataset name", &stem)?;
        Ok(stem)
    }
}

/// Free-form options forwarded by the HTTP layer.
///
/// Only the keys in [`AUGMENTATION_OPTIONS`] and [`SYSTEM_OPTIONS`] reach the
/// trainer, plus `resume`, which selects the resume path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobOptions(HashMap<String, String>);

impl JobOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_resume(&self) -> bool {
        self.get(RESUME_OPTION).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// `key=value` tokens for every known, non-empty option.
    #[must_use]
    pub fn passthrough_args(&self) -> Vec<String> {
        AUGMENTATION_OPTIONS
            .iter()
            .chain(SYSTEM_OPTIONS.iter())
            .filter_map(|key| {
                let value = self.get(key)?.trim();
                (!value.is_empty()).then(|| format!("{key}={value}"))
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for JobOptions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything needed to start (or resume) a training job.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub dataset: Option<DatasetUpload>,
    pub model: String,
    pub epochs: String,
    pub batch: String,
    pub imgsz: String,
    pub job_name: String,
    pub options: JobOptions,
}

impl StartRequest {
    #[must_use]
    pub fn is_resume(&self) -> bool {
        self.options.is_resume()
    }

    /// Checks that do not touch the filesystem.
    ///
    /// Numeric fields are only required to be present; the trainer rejects
    /// values it cannot parse.
    pub fn validate(&self) -> TrainingResult<()> {
        validate_path_component("job name", &self.job_name)?;
        if self.is_resume() {
            return Ok(());
        }

        match &self.dataset {
            Some(upload) if !upload.bytes.is_empty() => {
                upload.dataset_name()?;
            }
            _ => {
                return Err(TrainingError::Validation(
                    "a dataset archive is required to start a new training job".to_string(),
                ));
            }
        }

        for (field, value) in
            [("model", &self.model), ("epochs", &self.epochs), ("batch", &self.batch), ("imgsz", &self.imgsz)]
        {
            if value.trim().is_empty() {
                return Err(TrainingError::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}
