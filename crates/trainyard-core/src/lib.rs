//! Trainyard Core
//!
//! Configuration loading and the HTTP surface of the control panel.

pub mod config;
pub mod error;
pub mod server;

pub use config::{PanelConfig, PathsConfig, ServerConfig};
pub use error::{CoreError, Result};
pub use server::{AppState, build_router};
