//! `trainyard progress <job>`

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use trainyard_core::PanelConfig;
use trainyard_training::{MetricsReader, validate_path_component};

pub fn execute(config: &PanelConfig, job: &str, json_output: bool) -> Result<()> {
    validate_path_component("job name", job)?;
    let latest = MetricsReader::new(config.layout()).read_latest(job.trim());

    if json_output {
        let out = latest.map_or_else(|| json!({}), |row| json!(row));
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match latest {
        None => println!("{}", format!("No metrics recorded for {job} yet.").dimmed()),
        Some(row) => {
            println!();
            println!("{}", format!("Run {job}").bold().cyan());
            println!("  Epoch:    {}", row.epoch);
            println!("  Box loss: {}", row.box_loss);
            println!("  Cls loss: {}", row.cls_loss);
            println!("  mAP50:    {}", row.map50.to_string().green());
            println!();
        }
    }
    Ok(())
}
