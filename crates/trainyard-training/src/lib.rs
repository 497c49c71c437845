//! Trainyard Training
//!
//! Training orchestration for an object-detection control panel:
//! - Normalizing uploaded datasets into the YOLO layout (`dataset`)
//! - Running one external training job at a time (`JobRunner`)
//! - Reading per-epoch metrics while the trainer writes them (`MetricsReader`)
//! - Listing and cleaning up finished runs (`registry`)

pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod metrics;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod state;
pub mod trainer;

pub use dataset::{ConversionReport, DataManifest, DatasetLayout, NormalizedDataset, detect_layout, extract_archive, normalize};
pub use error::{TrainingError, TrainingResult};
pub use job::{DatasetUpload, JobOptions, StartRequest};
pub use layout::{TrainingLayout, validate_path_component};
pub use metrics::{MetricsReader, MetricsRow, MetricsSeries, MetricsTable};
pub use progress::{JobOutcome, ProgressEvent, ProgressSink};
pub use registry::{
    DashboardStats, ModelEntry, ModelKind, RunStatus, RunSummary, clear_cache, dashboard_stats, delete_run,
    discover_models, list_runs, validation_preview,
};
pub use runner::JobRunner;
pub use state::{JobState, LogSnapshot};
pub use trainer::{Invocation, TrainerCommand};
