//! HTTP server for the control panel.
//!
//! The browser UI drives training through these routes: it posts a dataset
//! archive, then polls logs, metrics and progress until a final log line
//! appears.

mod handlers;
pub mod logging;

pub use handlers::ApiError;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;
use trainyard_training::{JobRunner, MetricsReader, TrainingLayout};

use crate::config::PanelConfig;
use crate::error::Result;
use logging::RequestIdLayer;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    runner: JobRunner,
    metrics: MetricsReader,
}

impl AppState {
    #[must_use]
    pub fn new(runner: JobRunner) -> Self {
        let metrics = MetricsReader::new(runner.layout().clone());
        Self { runner, metrics }
    }

    #[must_use]
    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    #[must_use]
    pub fn layout(&self) -> &TrainingLayout {
        self.runner.layout()
    }
}

/// Build the API router. `body_limit` caps upload size in bytes.
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/start_training", post(handlers::start_training))
        .route("/stop_training", post(handlers::stop_training))
        .route("/get_logs", get(handlers::get_logs))
        .route("/get_metrics", get(handlers::get_metrics))
        .route("/get_progress", get(handlers::get_progress))
        .route("/get_val_image", get(handlers::get_val_image))
        .route("/api/dashboard_stats", get(handlers::dashboard_stats))
        .route("/api/runs", get(handlers::list_runs))
        .route("/api/models", get(handlers::list_models))
        .route("/api/delete_run", post(handlers::delete_run))
        .route("/api/clear_cache", post(handlers::clear_cache))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(RequestIdLayer)
        .with_state(state)
}

/// Start the HTTP server and block until Ctrl-C.
///
/// A running job is asked to stop before the server exits.
pub async fn run(config: &PanelConfig) -> Result<()> {
    let layout = config.init_dirs()?;
    let runner = JobRunner::new(layout, config.trainer.clone());
    let state = AppState::new(runner.clone());
    let app = build_router(state, config.server.body_limit_bytes());

    let listener = tokio::net::TcpListener::bind(config.server.address).await?;
    info!(
        address = %config.server.address,
        trainer = %config.trainer.executable.display(),
        "Trainyard server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                if runner.stop() {
                    info!("stopping active training job");
                }
            }
        })
        .await?;
    Ok(())
}
