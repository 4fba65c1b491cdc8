// src/server.rs
//
// HTTP surface. The pipeline itself is synchronous and non-reentrant, so
// requests take the single dispatch queue (a mutex around the pipeline) and
// run on the blocking pool; the async runtime only handles I/O.

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Mode, Pipeline, PipelineResult, RequestOptions, VehicleIdentity};
use crate::video::VideoAsset;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

const NO_VEHICLE_MESSAGE: &str =
    "No car detected in any frame. Please Upload a Video that belongs to a Car";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Mutex<Pipeline>>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: Config) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let processed_dir = state.config.storage.processed_dir.clone();
    let max_upload = state.config.server.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/upload_video", post(upload_video))
        .nest_service("/processed_frames", ServeDir::new(processed_dir))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application-level error wrapper. Only `Input` and `VideoOpen` surface as
/// client errors; everything else is an internal failure.
#[derive(Debug)]
pub enum AppError {
    Pipeline(PipelineError),
    Internal(String),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Pipeline(err @ PipelineError::Input(_))
            | AppError::Pipeline(err @ PipelineError::VideoOpen(_)) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            AppError::Pipeline(err) => {
                error!(error = %err, "internal pipeline error");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            AppError::Internal(msg) => {
                error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

struct UploadRequest {
    video: Vec<u8>,
    filename: String,
    mode: Mode,
    vehicle: Option<VehicleIdentity>,
}

async fn parse_upload(mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    let mut video: Option<(String, Vec<u8>)> = None;
    let mut mode_field: Option<String> = None;
    let mut car_name: Option<String> = None;
    let mut car_model: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Input(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PipelineError::Input(e.to_string()))?;
                video = Some((filename, data.to_vec()));
            }
            "mode" => {
                mode_field = Some(text_field(field).await?);
            }
            "car_name" => {
                car_name = Some(text_field(field).await?);
            }
            "car_model" => {
                car_model = Some(text_field(field).await?);
            }
            _ => {}
        }
    }

    let Some((filename, video)) = video else {
        return Err(PipelineError::Input("No video file uploaded".to_string()).into());
    };
    if filename.is_empty() {
        return Err(PipelineError::Input("No selected file".to_string()).into());
    }

    let mode = match mode_field.as_deref() {
        None | Some("frames") => Mode::AllFrames,
        Some("best") => Mode::BestFrame,
        Some(other) => {
            return Err(PipelineError::Input(format!("Unknown mode '{other}'")).into());
        }
    };

    let vehicle = match (car_name, car_model) {
        (Some(brand), Some(model)) if !brand.is_empty() && !model.is_empty() => {
            Some(VehicleIdentity { brand, model })
        }
        _ => None,
    };

    if mode == Mode::BestFrame && vehicle.is_none() {
        return Err(PipelineError::Input("Car name and model are required.".to_string()).into());
    }

    Ok(UploadRequest {
        video,
        filename,
        mode,
        vehicle,
    })
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| PipelineError::Input(e.to_string()).into())
}

async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let request = parse_upload(multipart).await?;

    // Persist the upload, stripping any path components from the client
    // filename.
    let basename = Path::new(&request.filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::Input("No selected file".to_string()))?
        .to_string();
    let stamp = chrono::Utc::now().timestamp_millis();
    let video_path =
        PathBuf::from(&state.config.storage.upload_dir).join(format!("{stamp}_{basename}"));

    tokio::fs::write(&video_path, &request.video)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {e}")))?;

    let deadline =
        Instant::now() + Duration::from_secs(state.config.server.request_deadline_secs);
    let opts = RequestOptions {
        mode: request.mode,
        vehicle: request.vehicle,
        deadline: Some(deadline),
    };

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut video = VideoAsset::open(&video_path)?;
        let mut pipeline = pipeline
            .lock()
            .map_err(|_| PipelineError::Detection {
                stage: "pipeline",
                reason: "dispatch queue poisoned".to_string(),
            })?;
        pipeline.run(&mut video, &opts)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Pipeline task failed: {e}")))??;

    let body = match result {
        PipelineResult::AllFrames { frames, labels } => json!({
            "message": "Processing complete!",
            "frames": frames,
            "labels": labels,
        }),
        PipelineResult::Best(Some(best)) => json!({
            "message": "Processing complete!",
            "best_frame": best,
        }),
        PipelineResult::Best(None) => json!({
            "message": NO_VEHICLE_MESSAGE,
        }),
    };

    Ok(Json(body))
}
