//! Panel configuration.
//!
//! Loaded from a TOML file, then adjusted by `TRAINYARD_*` environment
//! variables. Every field has a default, so an empty file is valid.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use trainyard_training::{TrainerCommand, TrainingLayout};

use crate::error::{CoreError, Result};

/// File picked up from the working directory when no `--config` is given.
pub const LOCAL_CONFIG_FILE: &str = "trainyard.toml";

pub const ENV_ADDRESS: &str = "TRAINYARD_ADDRESS";
pub const ENV_BASE_DIR: &str = "TRAINYARD_BASE_DIR";
pub const ENV_TRAINER: &str = "TRAINYARD_TRAINER";

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Largest accepted request body, in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7860))
}

fn default_max_upload_mb() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address(), max_upload_mb: default_max_upload_mb() }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn body_limit_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Filesystem roots. Relative entries resolve against `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub uploads: Option<PathBuf>,
    #[serde(default)]
    pub results: Option<PathBuf>,
    #[serde(default)]
    pub datasets: Option<PathBuf>,
    #[serde(default)]
    pub runs: Option<PathBuf>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { base_dir: default_base_dir(), uploads: None, results: None, datasets: None, runs: None }
    }
}

/// Root configuration for the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub trainer: TrainerCommand,
}

impl PanelConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| CoreError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Resolve the configuration for this process.
    ///
    /// An explicit file must exist. Otherwise `./trainyard.toml` is used when
    /// present, falling back to defaults. Environment overrides apply last.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let local = Path::new(LOCAL_CONFIG_FILE);
                if local.is_file() { Self::load_from_file(local)? } else { Self::default() }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TRAINYARD_*` overrides read through `lookup`.
    ///
    /// `TRAINYARD_TRAINER` is split on whitespace: the first token replaces
    /// the executable and any remaining tokens replace the leading arguments.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup(ENV_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.server.address = address.trim().parse()?;
            debug!(address = %self.server.address, "address overridden from environment");
        }
        if let Some(base_dir) = lookup(ENV_BASE_DIR).filter(|v| !v.trim().is_empty()) {
            self.paths.base_dir = PathBuf::from(base_dir.trim());
        }
        if let Some(trainer) = lookup(ENV_TRAINER) {
            let mut tokens = trainer.split_whitespace();
            if let Some(executable) = tokens.next() {
                self.trainer.executable = PathBuf::from(executable);
                let args: Vec<String> = tokens.map(str::to_string).collect();
                if !args.is_empty() {
                    self.trainer.args = args;
                }
            }
        }
        Ok(())
    }

    /// Directory layout described by `[paths]`.
    #[must_use]
    pub fn layout(&self) -> TrainingLayout {
        let base = &self.paths.base_dir;
        let defaults = TrainingLayout::for_base_dir(base);
        let resolve = |configured: &Option<PathBuf>, fallback: &Path| {
            configured.as_ref().map_or_else(|| fallback.to_path_buf(), |p| base.join(p))
        };
        TrainingLayout::new(
            base.clone(),
            resolve(&self.paths.uploads, defaults.uploads_dir()),
            resolve(&self.paths.results, defaults.results_dir()),
            resolve(&self.paths.datasets, defaults.datasets_dir()),
            resolve(&self.paths.runs, defaults.runs_dir()),
        )
    }

    /// Create every root directory and return the layout.
    pub fn init_dirs(&self) -> Result<TrainingLayout> {
        let layout = self.layout();
        layout.ensure_dirs()?;
        Ok(layout)
    }
}
