//! Trainyard CLI - control panel for object-detection training
//!
//! `trainyard serve` runs the web panel. The other commands inspect datasets
//! and runs on disk without starting a server.

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use trainyard_core::PanelConfig;

/// Trainyard - web control panel for training object detectors
#[derive(Parser, Debug)]
#[command(name = "trainyard", author, version, about = "Trainyard - object-detection training panel")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file (defaults to ./trainyard.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web panel
    Serve {
        /// Address to bind (overrides the configuration file)
        #[arg(long)]
        address: Option<SocketAddr>,
    },

    /// Convert a dataset directory into the trainable layout
    ///
    /// Directories that already carry a data.yaml are left untouched.
    Normalize {
        /// Dataset root
        dir: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List training runs
    Runs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the latest epoch metrics of a run
    Progress {
        /// Run (job) name
        job: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for command output
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Serve { address } => {
            let mut config = PanelConfig::discover(args.config.as_deref())?;
            if let Some(address) = address {
                config.server.address = address;
            }
            commands::serve::execute(config).await
        }
        Command::Normalize { dir, json } => commands::normalize::execute(&dir, json).await,
        Command::Runs { json } => {
            let config = PanelConfig::discover(args.config.as_deref())?;
            commands::runs::execute(&config, json)
        }
        Command::Progress { job, json } => {
            let config = PanelConfig::discover(args.config.as_deref())?;
            commands::progress::execute(&config, &job, json)
        }
    }
}
