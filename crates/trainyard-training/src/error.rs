use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// A job is already running.
    #[error("a training job is already running: {0}")]
    Conflict(String),

    #[error("invalid training request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The dataset matched none of the known layouts.
    #[error("dataset format error: {0}")]
    Format(String),

    #[error("training process error: {0}")]
    ExternalProcess(String),

    #[error("training job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
