//! Route handlers and the JSON error envelope.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use trainyard_training::{
    DatasetUpload, StartRequest, TrainingError, clear_cache as clear_cached_files, dashboard_stats as collect_stats,
    delete_run as remove_run, discover_models, list_runs as collect_runs, validate_path_component, validation_preview,
};

use super::AppState;

/// Error response: `{"status": "error", "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<TrainingError> for ApiError {
    fn from(err: TrainingError) -> Self {
        let status = match &err {
            TrainingError::Conflict(_) => StatusCode::CONFLICT,
            TrainingError::Validation(_) => StatusCode::BAD_REQUEST,
            TrainingError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: err.to_string() }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self { status: err.status(), message: err.body_text() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, message = %self.message, "request failed");
        }
        (self.status, Json(json!({"status": "error", "message": self.message}))).into_response()
    }
}

fn success() -> Json<Value> {
    Json(json!({"status": "success"}))
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| ApiError::internal(format!("worker task failed: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    #[serde(default)]
    project_name: Option<String>,
}

impl ProjectQuery {
    /// The project name, if present and safe to use as a directory name.
    fn job_name(&self) -> Option<String> {
        let name = self.project_name.as_deref()?.trim();
        validate_path_component("project name", name).ok()?;
        Some(name.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteRunRequest {
    #[serde(default)]
    name: Option<String>,
}

pub async fn start_training(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let request = read_start_request(&mut multipart).await?;
    // The job outlives this request; its handle is not needed.
    drop(state.runner.start(request)?);
    Ok(success())
}

async fn read_start_request(multipart: &mut Multipart) -> Result<StartRequest, ApiError> {
    let mut request = StartRequest::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "dataset" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            debug!(file = %file_name, size = bytes.len(), "received dataset upload");
            if !bytes.is_empty() {
                request.dataset = Some(DatasetUpload::new(file_name, bytes.to_vec()));
            }
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "model_name" => request.model = value,
            "epochs" => request.epochs = value,
            "batch" => request.batch = value,
            "imgsz" => request.imgsz = value,
            "project_name" => request.job_name = value,
            "" => {}
            _ => request.options.insert(name, value),
        }
    }
    Ok(request)
}

pub async fn stop_training(State(state): State<AppState>) -> Response {
    if state.runner.stop() {
        success().into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": "no training job is running"})))
            .into_response()
    }
}

pub async fn get_logs(State(state): State<AppState>) -> Response {
    Json(state.runner.logs()).into_response()
}

pub async fn get_metrics(State(state): State<AppState>, Query(query): Query<ProjectQuery>) -> Json<Value> {
    let Some(job_name) = query.job_name() else {
        return Json(json!({}));
    };
    match state.metrics.read_series(&job_name) {
        Some(series) => Json(json!({"status": "success", "data": series})),
        None => Json(json!({"status": "waiting"})),
    }
}

pub async fn get_progress(State(state): State<AppState>, Query(query): Query<ProjectQuery>) -> Json<Value> {
    let latest = query.job_name().and_then(|job_name| state.metrics.read_latest(&job_name));
    match latest.and_then(|row| serde_json::to_value(row).ok()) {
        Some(row) => Json(row),
        None => Json(json!({})),
    }
}

pub async fn get_val_image(State(state): State<AppState>, Query(query): Query<ProjectQuery>) -> Response {
    let Some(path) = query.job_name().and_then(|job_name| validation_preview(state.layout(), &job_name)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "validation preview vanished");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub async fn dashboard_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let layout = state.layout().clone();
    let stats = blocking(move || collect_stats(&layout)).await?;
    Ok(Json(stats).into_response())
}

pub async fn list_runs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let layout = state.layout().clone();
    let runs = blocking(move || collect_runs(&layout)).await?;
    Ok(Json(runs).into_response())
}

pub async fn list_models(State(state): State<AppState>) -> Result<Response, ApiError> {
    let layout = state.layout().clone();
    let models = blocking(move || discover_models(&layout)).await?;
    Ok(Json(models).into_response())
}

pub async fn delete_run(
    State(state): State<AppState>,
    Json(payload): Json<DeleteRunRequest>,
) -> Result<Response, ApiError> {
    let name = payload.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("run name is required"));
    }
    let job_state = state.runner.state();
    if job_state.is_active() && job_state.job_name().as_deref() == Some(name.as_str()) {
        return Err(TrainingError::Conflict(name).into());
    }

    let layout = state.layout().clone();
    let run = name.clone();
    if blocking(move || remove_run(&layout, &run)).await?? {
        info!(run = %name, "run deleted");
        Ok(success().into_response())
    } else {
        Err(ApiError::bad_request(format!("run not found: {name}")))
    }
}

pub async fn clear_cache(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let layout = state.layout().clone();
    let count = blocking(move || clear_cached_files(&layout)).await?;
    info!(count, "cache cleared");
    Ok(Json(json!({"status": "success", "count": count})))
}
