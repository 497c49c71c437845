//! `trainyard serve`

use anyhow::{Context, Result};
use colored::Colorize;
use trainyard_core::PanelConfig;

pub async fn execute(config: PanelConfig) -> Result<()> {
    let layout = config.layout();
    println!();
    println!("{}", "Trainyard".bold().cyan());
    println!("  Panel:    {}", format!("http://{}", config.server.address).green());
    println!("  Runs:     {}", layout.runs_dir().display().to_string().dimmed());
    println!("  Datasets: {}", layout.datasets_dir().display().to_string().dimmed());
    println!("  Trainer:  {}", config.trainer.executable.display().to_string().dimmed());
    println!();

    trainyard_core::server::run(&config).await.context("Server exited with an error")
}
