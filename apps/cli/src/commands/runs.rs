//! `trainyard runs`

use anyhow::Result;
use colored::Colorize;
use trainyard_core::PanelConfig;
use trainyard_training::{RunStatus, list_runs};

pub fn execute(config: &PanelConfig, json_output: bool) -> Result<()> {
    let runs = list_runs(&config.layout());

    if json_output {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Training Runs ({})", runs.len()).bold().cyan());
    println!();

    if runs.is_empty() {
        println!("  {}", "No training runs found.".dimmed());
        println!();
        return Ok(());
    }

    println!("{:<32} {:>7} {:>9}  {}", "Name", "Epochs", "mAP50 %", "Status");
    println!("{}", "─".repeat(64));
    for run in runs {
        let status = match run.status {
            RunStatus::Completed => "Completed".green(),
            RunStatus::Error => "Error".red(),
            RunStatus::NoData => "No Data".dimmed(),
        };
        println!("{:<32} {:>7} {:>9.2}  {}", run.name.cyan(), run.epochs, run.last_map, status);
    }
    println!();
    Ok(())
}
