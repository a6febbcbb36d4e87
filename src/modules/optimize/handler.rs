use crate::common::fs::{ensure_dir, TempArtifacts};
use crate::common::ids::new_request_id;
use crate::common::response::{ApiError, ErrorBody};
use crate::common::upload::{accept_upload, UploadLimits};
use crate::infrastructure::encoder::ffmpeg::{TranscodeEvent, TranscodeJob};
use crate::modules::optimize::body::ArtifactStream;
use crate::modules::optimize::dto::{CompressionOptions, OPTION_FIELDS};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, Instrument, Span};

const DOWNLOAD_NAME: &str = "optimized.mp4";

/// Optimize Video
/// Re-encodes the uploaded video and streams the result back as `optimized.mp4`.
#[utoipa::path(
    post,
    path = "/api/optimize",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "`video` file part plus optional crf, preset, width, fps, audioBitrate, videoCodec, audioCodec fields"
    ),
    responses(
        (status = 200, description = "Optimized video", content_type = "video/mp4", body = Vec<u8>),
        (status = 400, description = "Missing file or malformed multipart", body = ErrorBody),
        (status = 401, description = "Missing or invalid api key", body = ErrorBody),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorBody),
        (status = 415, description = "Unsupported file type", body = ErrorBody),
        (status = 500, description = "Encoding failed", body = ErrorBody)
    ),
    tag = "Optimize",
    security(("api_key" = []))
)]
pub async fn optimize_video(State(state): State<AppState>, req: Request) -> Result<Response, ApiError> {
    let request_id = new_request_id();
    let span = info_span!("optimize", request_id = %request_id);
    run_pipeline(state, request_id, req).instrument(span).await
}

async fn run_pipeline(state: AppState, request_id: String, req: Request) -> Result<Response, ApiError> {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());
    let content_type = header_string(req.headers(), header::CONTENT_TYPE);
    let content_length = header_string(req.headers(), header::CONTENT_LENGTH);
    info!(
        client = ?client,
        content_type = ?content_type,
        content_length = ?content_length,
        "Incoming optimize request"
    );

    let mut multipart = match Multipart::from_request(req, &state).await {
        Ok(m) => m,
        Err(rejection) => {
            info!(reason = %rejection.body_text(), "Missing video file");
            return Err(ApiError::MissingFile);
        }
    };

    let mut artifacts = TempArtifacts::new(&request_id);
    let limits = UploadLimits {
        staging_dir: &state.config.upload_dir,
        max_file_size: state.config.max_file_size,
    };
    let form = match accept_upload(&mut multipart, &limits, &mut artifacts).await {
        Ok(form) => form,
        Err(e) => {
            info!(error = %e, "Upload rejected");
            artifacts.release().await;
            return Err(e);
        }
    };
    let asset = form.asset;
    info!(
        filename = %asset.original_name,
        mimetype = %asset.mime_type,
        size = asset.size,
        path = %asset.path.display(),
        "Upload received"
    );

    let raw: HashMap<String, String> = form
        .fields
        .into_iter()
        .filter(|(key, _)| OPTION_FIELDS.contains(&key.as_str()))
        .collect();
    let options = CompressionOptions::sanitize(&raw);
    info!(
        options = %serde_json::to_string(&options).unwrap_or_default(),
        "Compression options"
    );

    let mut job = TranscodeJob::new(&asset.path, &state.config.output_dir, &request_id, &options);
    artifacts.track(&job.output_path);

    let output_path = match transcode(&state, &mut job, &asset.path).await {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "Optimization failed");
            artifacts.release().await;
            return Err(e);
        }
    };
    info!(output_path = %output_path.display(), "Optimization finished");

    let file = match tokio::fs::File::open(&output_path).await {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, "Failed to open optimized output");
            artifacts.release().await;
            return Err(e.into());
        }
    };
    let length = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            error!(error = %e, "Failed to read optimized output metadata");
            drop(file);
            artifacts.release().await;
            return Err(e.into());
        }
    };

    let stream = ArtifactStream::new(file, artifacts, Span::current());
    let headers = [
        (header::CONTENT_TYPE, "video/mp4".to_string()),
        (header::CONTENT_LENGTH, length.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{DOWNLOAD_NAME}\""),
        ),
    ];
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn transcode(
    state: &AppState,
    job: &mut TranscodeJob,
    input_path: &std::path::Path,
) -> Result<std::path::PathBuf, ApiError> {
    if let Some(parent) = input_path.parent() {
        ensure_dir(parent).await?;
    }
    ensure_dir(&state.config.output_dir).await?;

    info!(profile = ?job.profile, "Starting optimization");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let log_events = async move {
        while let Some(event) = rx.recv().await {
            match event {
                TranscodeEvent::Started { command_line } => {
                    info!(command_line = %command_line, "ffmpeg start")
                }
                TranscodeEvent::Progress { percent } => {
                    info!(percent = percent.round() as u32, "ffmpeg progress")
                }
            }
        }
    };

    let (result, ()) = tokio::join!(state.transcoder.run(job, Some(tx)), log_events);
    match result {
        Ok(path) => {
            info!("ffmpeg end");
            Ok(path)
        }
        Err(e) => {
            error!(error = %e, "ffmpeg error");
            Err(e.into())
        }
    }
}
