//! `trainyard normalize <dir>`

use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};

pub async fn execute(dir: &Path, json_output: bool) -> Result<()> {
    if !dir.is_dir() {
        bail!("Dataset directory not found: {}", dir.display());
    }
    let root: PathBuf = dir.to_path_buf();
    let normalized = tokio::task::spawn_blocking(move || trainyard_training::normalize(&root))
        .await?
        .with_context(|| format!("Failed to normalize {}", dir.display()))?;

    if json_output {
        let conversion = normalized.conversion.as_ref().map(|r| {
            json!({
                "images_copied": r.images_copied,
                "images_missing": r.images_missing,
                "boxes_written": r.boxes_written,
                "annotations_skipped": r.annotations_skipped,
                "validation_split": r.validation_split,
                "names": r.names,
            })
        });
        let out = json!({
            "manifest": normalized.manifest_path,
            "converted": conversion.is_some(),
            "conversion": conversion,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    match &normalized.conversion {
        None => println!("{}", "Dataset already in canonical layout".bold().green()),
        Some(report) => {
            println!("{}", "Converted COCO dataset".bold().green());
            println!("  Classes:  {}", report.names.join(", ").cyan());
            println!("  Images:   {}", report.images_copied);
            println!("  Boxes:    {}", report.boxes_written);
            if report.images_missing > 0 {
                println!("  {}", format!("{} images referenced but missing", report.images_missing).yellow());
            }
            if report.annotations_skipped > 0 {
                println!("  {}", format!("{} annotations skipped", report.annotations_skipped).yellow());
            }
            if !report.validation_split {
                println!("  {}", "No validation split found".yellow());
            }
        }
    }
    println!("  Manifest: {}", normalized.manifest_path.display().to_string().dimmed());
    println!();
    Ok(())
}
