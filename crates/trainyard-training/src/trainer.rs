use crate::job::StartRequest;
use crate::layout::TrainingLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How to call the external trainer, e.g. `yolo train`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerCommand {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Arguments placed before the `key=value` tokens.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_executable() -> PathBuf {
    PathBuf::from("yolo")
}

fn default_args() -> Vec<String> {
    vec!["train".to_string()]
}

impl Default for TrainerCommand {
    fn default() -> Self {
        Self { executable: default_executable(), args: default_args() }
    }
}

impl TrainerCommand {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { executable: executable.into(), args }
    }

    /// Arguments for a fresh run against `manifest`.
    #[must_use]
    pub fn fresh(&self, request: &StartRequest, manifest: &Path, layout: &TrainingLayout) -> Invocation {
        let mut args = self.args.clone();
        args.push(format!("model={}", request.model.trim()));
        args.push(format!("data={}", manifest.display()));
        args.push(format!("epochs={}", request.epochs.trim()));
        args.push(format!("batch={}", request.batch.trim()));
        args.push(format!("imgsz={}", request.imgsz.trim()));
        args.push(format!("project={}", layout.runs_dir().display()));
        args.push(format!("name={}", request.job_name.trim()));
        args.push("exist_ok=True".to_string());
        args.extend(request.options.passthrough_args());
        Invocation { program: self.executable.clone(), args }
    }

    /// Arguments for a resumed run.
    ///
    /// The trainer restores data, hyperparameters and options from the
    /// checkpoint, so nothing else is passed.
    #[must_use]
    pub fn resume(&self, checkpoint: &Path) -> Invocation {
        let mut args = self.args.clone();
        args.push(format!("model={}", checkpoint.display()));
        args.push("resume=True".to_string());
        Invocation { program: self.executable.clone(), args }
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DatasetUpload, JobOptions};

    fn request(options: JobOptions) -> StartRequest {
        StartRequest {
            dataset: Some(DatasetUpload::new("d.zip", vec![1])),
            model: "yolo11n.pt".to_string(),
            epochs: "5".to_string(),
            batch: "8".to_string(),
            imgsz: "320".to_string(),
            job_name: "run1".to_string(),
            options,
        }
    }

    #[test]
    fn test_fresh_invocation() {
        let layout = TrainingLayout::for_base_dir(Path::new("/srv/panel"));
        let options = JobOptions::new().with("fliplr", "0.5").with("workers", "2").with("resume", "false");
        let inv = TrainerCommand::default().fresh(&request(options), Path::new("/data/data.yaml"), &layout);

        assert_eq!(inv.program, PathBuf::from("yolo"));
        assert_eq!(
            inv.args,
            vec![
                "train",
                "model=yolo11n.pt",
                "data=/data/data.yaml",
                "epochs=5",
                "batch=8",
                "imgsz=320",
                "project=/srv/panel/runs",
                "name=run1",
                "exist_ok=True",
                "fliplr=0.5",
                "workers=2",
            ]
        );
    }

    #[test]
    fn test_resume_invocation_ignores_options() {
        let inv = TrainerCommand::default().resume(Path::new("/srv/panel/runs/run1/weights/last.pt"));
        assert_eq!(inv.args, vec!["train", "model=/srv/panel/runs/run1/weights/last.pt", "resume=True"]);
        assert_eq!(inv.to_string(), "yolo train model=/srv/panel/runs/run1/weights/last.pt resume=True");
    }
}
