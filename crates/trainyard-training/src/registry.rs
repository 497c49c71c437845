use crate::error::TrainingResult;
use crate::layout::{TrainingLayout, validate_path_component};
use crate::metrics::{MetricsTable, round_to};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const BEST_WEIGHTS: &str = "best.pt";
const WEIGHTS_EXTENSION: &str = "pt";
const PREVIEW_IMAGES: [&str; 2] = ["val_batch0_pred.jpg", "val_batch0_labels.jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// A readable metrics file exists.
    Completed,
    /// The metrics file exists but is unreadable or has no epochs.
    Error,
    #[serde(rename = "No Data")]
    NoData,
}

/// One directory under the runs root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub epochs: usize,
    /// Final-epoch mAP50 as a percentage.
    pub last_map: f64,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub model_count: usize,
    pub dataset_count: usize,
    pub total_runs: usize,
    /// Best mAP50 across every run, as a percentage.
    pub best_map: f64,
    /// Megabytes used by uploads, results, runs and datasets.
    pub disk_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Pretrained,
    Trained,
}

/// A weights file that can be handed to the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: ModelKind,
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).filter(|p| p.is_dir()).collect();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn as_percent(value: f64) -> f64 {
    round_to(value * 100.0, 2)
}

/// Summaries of every run directory, sorted by name.
pub fn list_runs(layout: &TrainingLayout) -> Vec<RunSummary> {
    sorted_subdirs(layout.runs_dir())
        .into_iter()
        .map(|run_dir| {
            let name = dir_name(&run_dir);
            let metrics_path = layout.metrics_path(&name);
            if !metrics_path.is_file() {
                return RunSummary { name, epochs: 0, last_map: 0.0, status: RunStatus::NoData };
            }
            match MetricsTable::load(&metrics_path) {
                Some(table) if !table.is_empty() => RunSummary {
                    name,
                    epochs: table.len(),
                    last_map: table.last_map50().map(as_percent).unwrap_or(0.0),
                    status: RunStatus::Completed,
                },
                _ => RunSummary { name, epochs: 0, last_map: 0.0, status: RunStatus::Error },
            }
        })
        .collect()
}

/// Pretrained weights in the base directory plus `best.pt` of every run.
pub fn discover_models(layout: &TrainingLayout) -> Vec<ModelEntry> {
    let mut out = pretrained_weights(layout.base_dir());

    let walker = WalkDir::new(layout.runs_dir()).sort_by_file_name().into_iter().filter_map(Result::ok);
    for entry in walker {
        if !entry.file_type().is_file() || entry.file_name() != BEST_WEIGHTS {
            continue;
        }
        // <runs>/<job>/weights/best.pt
        let job_name = entry
            .path()
            .parent()
            .and_then(Path::parent)
            .map(dir_name)
            .unwrap_or_default();
        out.push(ModelEntry {
            name: format!("{job_name} ({BEST_WEIGHTS})"),
            path: entry.path().to_path_buf(),
            kind: ModelKind::Trained,
        });
    }
    out
}

fn pretrained_weights(base_dir: &Path) -> Vec<ModelEntry> {
    let Ok(entries) = std::fs::read_dir(base_dir) else {
        return Vec::new();
    };
    let mut models: Vec<ModelEntry> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == WEIGHTS_EXTENSION))
        .map(|path| ModelEntry { name: dir_name(&path), path, kind: ModelKind::Pretrained })
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    models
}

/// Aggregate numbers for the dashboard.
pub fn dashboard_stats(layout: &TrainingLayout) -> DashboardStats {
    let runs = sorted_subdirs(layout.runs_dir());
    let best_map = runs
        .iter()
        .filter_map(|run| MetricsTable::load(&run.join(crate::layout::METRICS_FILE)))
        .filter_map(|table| table.best_map50())
        .fold(0.0, f64::max);

    let disk_bytes: u64 = [layout.uploads_dir(), layout.results_dir(), layout.runs_dir(), layout.datasets_dir()]
        .into_iter()
        .map(directory_size)
        .sum();

    DashboardStats {
        model_count: pretrained_weights(layout.base_dir()).len() + runs.len(),
        dataset_count: sorted_subdirs(layout.datasets_dir()).len(),
        total_runs: runs.len(),
        best_map: as_percent(best_map),
        disk_usage: round_to(disk_bytes as f64 / (1024.0 * 1024.0), 1),
    }
}

fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Remove a run directory. Returns `false` if it does not exist.
pub fn delete_run(layout: &TrainingLayout, name: &str) -> TrainingResult<bool> {
    validate_path_component("run name", name)?;
    let dir = layout.run_dir(name.trim());
    if !dir.is_dir() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir)?;
    debug!(run = %name, "deleted run");
    Ok(true)
}

/// Delete uploaded archives and inference results. Returns the number of files removed.
pub fn clear_cache(layout: &TrainingLayout) -> usize {
    let mut cleared = 0;
    for dir in [layout.uploads_dir(), layout.results_dir()] {
        let Ok(entries) = std::fs::read_dir(dir) else { continue };
        for path in entries.filter_map(Result::ok).map(|e| e.path()).filter(|p| p.is_file()) {
            match std::fs::remove_file(&path) {
                Ok(()) => cleared += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cached file"),
            }
        }
    }
    cleared
}

/// Validation preview rendered by the trainer: predictions if present, else ground truth.
pub fn validation_preview(layout: &TrainingLayout, job_name: &str) -> Option<PathBuf> {
    validate_path_component("job name", job_name).ok()?;
    let run_dir = layout.run_dir(job_name.trim());
    PREVIEW_IMAGES.iter().map(|name| run_dir.join(name)).find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout_with_runs() -> (TempDir, TrainingLayout) {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::for_base_dir(temp.path());
        layout.ensure_dirs().unwrap();

        fs::create_dir_all(layout.run_dir("alpha")).unwrap();
        fs::write(
            layout.metrics_path("alpha"),
            "epoch,train/box_loss,metrics/mAP50(B)\n1,0.9,0.41\n2,0.8,0.375\n",
        )
        .unwrap();

        fs::create_dir_all(layout.weights_dir("beta")).unwrap();
        fs::write(layout.weights_dir("beta").join("best.pt"), b"weights").unwrap();

        fs::create_dir_all(layout.run_dir("gamma")).unwrap();
        fs::write(layout.metrics_path("gamma"), "not,a,metrics\nfile\n").unwrap();
        (temp, layout)
    }

    #[test]
    fn test_list_runs() {
        let (_temp, layout) = layout_with_runs();
        let runs = list_runs(&layout);
        assert_eq!(runs.len(), 3);

        assert_eq!(runs[0], RunSummary { name: "alpha".into(), epochs: 2, last_map: 37.5, status: RunStatus::Completed });
        assert_eq!(runs[1].status, RunStatus::NoData);
        assert_eq!(runs[2].status, RunStatus::Error);
    }

    #[test]
    fn test_dashboard_stats() {
        let (temp, layout) = layout_with_runs();
        fs::write(temp.path().join("yolo11n.pt"), b"pretrained").unwrap();
        fs::create_dir_all(layout.dataset_dir("coco")).unwrap();

        let stats = dashboard_stats(&layout);
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.dataset_count, 1);
        assert_eq!(stats.model_count, 4);
        assert_eq!(stats.best_map, 41.0);
    }

    #[test]
    fn test_discover_models() {
        let (temp, layout) = layout_with_runs();
        fs::write(temp.path().join("yolo11n.pt"), b"pretrained").unwrap();

        let models = discover_models(&layout);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].kind, ModelKind::Pretrained);
        assert_eq!(models[1].name, "beta (best.pt)");
        assert_eq!(models[1].kind, ModelKind::Trained);
    }

    #[test]
    fn test_delete_run_rejects_traversal() {
        let (_temp, layout) = layout_with_runs();
        assert!(delete_run(&layout, "../static").is_err());
        assert!(!delete_run(&layout, "missing").unwrap());
        assert!(delete_run(&layout, "alpha").unwrap());
        assert!(!layout.run_dir("alpha").exists());
    }

    #[test]
    fn test_clear_cache_counts_files() {
        let (_temp, layout) = layout_with_runs();
        fs::write(layout.upload_path("a.zip"), b"a").unwrap();
        fs::write(layout.results_dir().join("result_b.jpg"), b"b").unwrap();
        fs::create_dir_all(layout.uploads_dir().join("nested")).unwrap();

        assert_eq!(clear_cache(&layout), 2);
        assert!(layout.uploads_dir().join("nested").exists());
    }

    #[test]
    fn test_validation_preview_prefers_predictions() {
        let (_temp, layout) = layout_with_runs();
        assert!(validation_preview(&layout, "alpha").is_none());

        fs::write(layout.run_dir("alpha").join("val_batch0_labels.jpg"), b"l").unwrap();
        assert!(validation_preview(&layout, "alpha").unwrap().ends_with("val_batch0_labels.jpg"));

        fs::write(layout.run_dir("alpha").join("val_batch0_pred.jpg"), b"p").unwrap();
        assert!(validation_preview(&layout, "alpha").unwrap().ends_with("val_batch0_pred.jpg"));
    }
}
