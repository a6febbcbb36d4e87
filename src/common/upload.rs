use crate::common::fs::{ensure_dir, TempArtifacts};
use crate::common::ids::staged_file_name;
use crate::common::response::ApiError;
use axum::{
    body::Bytes,
    extract::multipart::{Field, Multipart, MultipartError},
    http::StatusCode,
};
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

pub const VIDEO_FIELD: &str = "video";

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["video/mp4", "video/webm", "video/avi", "video/quicktime"];

const MAX_TEXT_FIELD_SIZE: usize = 1024 * 1024;

/// The single video file accepted for a request, persisted to the staging directory.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub original_name: String,
}

#[derive(Debug)]
pub struct UploadForm {
    pub asset: UploadedAsset,
    pub fields: HashMap<String, String>,
}

/// Text parts by name. A name sent more than once has no single value and
/// is dropped, the same as any other option of the wrong shape.
#[derive(Debug, Default)]
struct TextFields {
    values: HashMap<String, String>,
    repeated: HashSet<String>,
}

impl TextFields {
    fn insert(&mut self, name: String, value: String) {
        if self.repeated.contains(&name) {
            return;
        }
        if self.values.remove(&name).is_some() {
            self.repeated.insert(name);
        } else {
            self.values.insert(name, value);
        }
    }
}

pub struct UploadLimits<'a> {
    pub staging_dir: &'a Path,
    pub max_file_size: u64,
}

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// Drains the multipart body: text fields are collected, the one `video`
/// file is checked against the allow-list and streamed to disk.
///
/// The staged path is registered in `artifacts` before the first byte is
/// written, so a rejected or interrupted upload leaves nothing behind once
/// the caller releases them.
pub async fn accept_upload(
    multipart: &mut Multipart,
    limits: &UploadLimits<'_>,
    artifacts: &mut TempArtifacts,
) -> Result<UploadForm, ApiError> {
    let mut asset: Option<UploadedAsset> = None;
    let mut fields = TextFields::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = read_text(field).await?;
            fields.insert(name, value);
            continue;
        };

        if name != VIDEO_FIELD {
            return Err(ApiError::UnexpectedFile);
        }
        if asset.is_some() {
            return Err(ApiError::TooManyFiles);
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        info!(mimetype = %mime_type, originalname = %original_name, "upload file filter");
        if !is_allowed_mime(&mime_type) {
            return Err(ApiError::UnsupportedFileType);
        }

        ensure_dir(limits.staging_dir).await?;
        let path = limits.staging_dir.join(staged_file_name());
        artifacts.track(&path);

        let size = stream_to_file(field, &path, limits.max_file_size).await?;
        asset = Some(UploadedAsset {
            path,
            mime_type,
            size,
            original_name,
        });
    }

    let asset = asset.ok_or(ApiError::MissingFile)?;
    Ok(UploadForm {
        asset,
        fields: fields.values,
    })
}

async fn stream_to_file(mut field: Field<'_>, path: &Path, max_file_size: u64) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.next().await {
        let chunk: Bytes = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Upload stream error: {}", e);
                return Err(multipart_error(e));
            }
        };

        written += chunk.len() as u64;
        if written > max_file_size {
            return Err(ApiError::FileTooLarge);
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn read_text(mut field: Field<'_>) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(multipart_error)?;
        if buf.len() + chunk.len() > MAX_TEXT_FIELD_SIZE {
            return Err(ApiError::FieldTooLong);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge
    } else {
        ApiError::Multipart(err.body_text())
    }
}
