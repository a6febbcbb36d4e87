//! End-to-end tests for `POST /api/optimize` and `GET /health`.
//!
//! The encoder is replaced by small shell scripts so the full pipeline
//! (auth, upload, options, child process, streaming, cleanup) runs without
//! a real ffmpeg.

#![cfg(unix)]

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tempfile::TempDir;
use video_optimizer::app::create_app;
use video_optimizer::config::settings::AppConfig;
use video_optimizer::state::AppState;

const API_KEY: &str = "test-api-key";

// Copies the input to the output, prints progress, records its arguments
// in `<output_dir>/../encoder.args`.
const COPY_ENCODER: &str = r#"#!/bin/sh
prev=""; in=""; out=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  prev="$arg"; out="$arg"
done
printf '%s\n' "$@" > "$(dirname "$out")/../encoder.args"
echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 100 kb/s" >&2
echo "out_time_us=2500000"
echo "progress=continue"
echo "out_time_us=10000000"
echo "progress=end"
cp "$in" "$out"
"#;

// Leaves a partial output behind and fails.
const FAILING_ENCODER: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do out="$arg"; done
printf '%s\n' "$@" > "$(dirname "$out")/../encoder.args"
printf 'partial' > "$out"
echo "tmp/uploads/abc: Invalid data found when processing input" >&2
exit 1
"#;

struct Encoders {
    _dir: TempDir,
    copy: PathBuf,
    failing: PathBuf,
}

// Written once, before any test spawns a child, to avoid "text file busy".
static ENCODERS: LazyLock<Encoders> = LazyLock::new(|| {
    let dir = tempfile::tempdir().expect("Failed to create encoder dir");
    let copy = write_script(dir.path(), "copy-encoder.sh", COPY_ENCODER);
    let failing = write_script(dir.path(), "failing-encoder.sh", FAILING_ENCODER);
    Encoders {
        _dir: dir,
        copy,
        failing,
    }
});

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("Failed to write encoder script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to chmod encoder script");
    path
}

struct TestApp {
    server: TestServer,
    root: TempDir,
}

impl TestApp {
    fn upload_dir(&self) -> PathBuf {
        self.root.path().join("uploads")
    }

    fn output_dir(&self) -> PathBuf {
        self.root.path().join("optimized")
    }

    fn encoder_args(&self) -> Option<Vec<String>> {
        std::fs::read_to_string(self.root.path().join("encoder.args"))
            .ok()
            .map(|s| s.lines().map(str::to_string).collect())
    }

    async fn assert_temp_dirs_empty(&self) {
        for dir in [self.upload_dir(), self.output_dir()] {
            let mut remaining = usize::MAX;
            for _ in 0..100 {
                remaining = count_entries(&dir);
                if remaining == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            assert_eq!(remaining, 0, "{} still has temp files", dir.display());
        }
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn setup(encoder: &Path, max_file_size: u64) -> TestApp {
    let root = tempfile::tempdir().expect("Failed to create temp directory");
    let upload_dir = root.path().join("uploads");
    let output_dir = root.path().join("optimized");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = AppConfig {
        api_key: API_KEY.to_string(),
        server_port: 0,
        max_file_size,
        upload_dir,
        output_dir,
        ffmpeg_path: encoder.to_string_lossy().into_owned(),
    };
    let app = create_app(AppState::new(config));
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp { server, root }
}

fn setup_default() -> TestApp {
    setup(&ENCODERS.copy, 64 * 1024 * 1024)
}

fn video_part(bytes: Vec<u8>, mime: &str) -> Part {
    Part::bytes(bytes::Bytes::from(bytes))
        .file_name("clip.mp4")
        .mime_type(mime)
}

fn fake_video(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
    let idx = args
        .iter()
        .position(|a| a == flag)
        .unwrap_or_else(|| panic!("missing {flag} in {args:?}"));
    &args[idx + 1]
}

#[tokio::test]
async fn health_reports_ok_without_auth() {
    let app = setup_default();

    let response = app.server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<serde_json::Value>(), serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn missing_api_key_is_rejected_before_upload() {
    let app = setup_default();
    let form = MultipartForm::new().add_part("video", video_part(fake_video(1024), "video/mp4"));

    let response = app.server.post("/api/optimize").multipart(form).await;

    assert_eq!(response.status_code(), 401);
    assert_eq!(
        response.json::<serde_json::Value>(),
        serde_json::json!({ "error": "Unauthorized" })
    );
    assert_eq!(count_entries(&app.upload_dir()), 0);
    assert!(app.encoder_args().is_none());
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let app = setup_default();
    let form = MultipartForm::new().add_part("video", video_part(fake_video(1024), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", "not-the-key")
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 401);
    assert!(app.encoder_args().is_none());
}

#[tokio::test]
async fn valid_upload_is_optimized_and_cleaned_up() {
    let app = setup_default();
    let input = fake_video(10 * 1024 * 1024);
    let form = MultipartForm::new().add_part("video", video_part(input.clone(), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 200);
    let headers = response.headers();
    assert_eq!(headers.get("content-type").unwrap(), "video/mp4");
    assert_eq!(
        headers.get("content-disposition").unwrap(),
        "attachment; filename=\"optimized.mp4\""
    );
    assert_eq!(response.as_bytes().len(), input.len());
    assert_eq!(response.as_bytes().as_ref(), input.as_slice());

    app.assert_temp_dirs_empty().await;
}

#[tokio::test]
async fn defaults_are_used_when_no_options_given() {
    let app = setup_default();
    let form = MultipartForm::new().add_part("video", video_part(fake_video(4096), "video/webm"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), 200);

    let args = app.encoder_args().expect("encoder was not invoked");
    assert_eq!(arg_after(&args, "-c:v"), "libx264");
    assert_eq!(arg_after(&args, "-crf"), "30");
    assert_eq!(arg_after(&args, "-preset"), "slow");
    assert_eq!(arg_after(&args, "-vf"), "scale=854:-2");
    assert_eq!(arg_after(&args, "-r"), "24");
    assert_eq!(arg_after(&args, "-c:a"), "aac");
    assert_eq!(arg_after(&args, "-b:a"), "96k");
    assert_eq!(arg_after(&args, "-movflags"), "+faststart");
    assert_eq!(arg_after(&args, "-pix_fmt"), "yuv420p");

    let output = PathBuf::from(args.last().unwrap());
    let name = output.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("optimized-") && name.ends_with(".mp4"), "{name}");

    app.assert_temp_dirs_empty().await;
}

#[tokio::test]
async fn out_of_range_crf_is_dropped() {
    let app = setup_default();
    let form = MultipartForm::new()
        .add_text("crf", "999")
        .add_part("video", video_part(fake_video(4096), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 200);
    let args = app.encoder_args().expect("encoder was not invoked");
    assert_eq!(arg_after(&args, "-crf"), "30");
}

#[tokio::test]
async fn repeated_option_field_is_dropped() {
    let app = setup_default();
    let form = MultipartForm::new()
        .add_text("crf", "18")
        .add_text("crf", "20")
        .add_text("preset", "fast")
        .add_part("video", video_part(fake_video(4096), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 200);
    let args = app.encoder_args().expect("encoder was not invoked");
    assert_eq!(arg_after(&args, "-crf"), "30");
    assert_eq!(arg_after(&args, "-preset"), "fast");
}

#[tokio::test]
async fn valid_options_reach_the_encoder() {
    let app = setup_default();
    let form = MultipartForm::new()
        .add_part("video", video_part(fake_video(4096), "video/quicktime"))
        .add_text("crf", "20")
        .add_text("preset", "fast")
        .add_text("width", "1280")
        .add_text("fps", "30")
        .add_text("audioBitrate", "128k")
        .add_text("videoCodec", "libx265")
        .add_text("audioCodec", "libopus")
        .add_text("unrelated", "ignored");

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 200);
    let args = app.encoder_args().expect("encoder was not invoked");
    assert_eq!(arg_after(&args, "-c:v"), "libx265");
    assert_eq!(arg_after(&args, "-crf"), "20");
    assert_eq!(arg_after(&args, "-preset"), "fast");
    assert_eq!(arg_after(&args, "-vf"), "scale=1280:-2");
    assert_eq!(arg_after(&args, "-r"), "30");
    assert_eq!(arg_after(&args, "-c:a"), "libopus");
    assert_eq!(arg_after(&args, "-b:a"), "128k");
    assert!(!args.iter().any(|a| a == "ignored"));
}

#[tokio::test]
async fn disallowed_mime_type_is_rejected() {
    let app = setup_default();
    let form = MultipartForm::new().add_part("video", video_part(fake_video(1024), "video/x-msvideo"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 415);
    assert_eq!(
        response.json::<serde_json::Value>(),
        serde_json::json!({ "error": "Unsupported file type" })
    );
    assert!(app.encoder_args().is_none());
    app.assert_temp_dirs_empty().await;
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let app = setup_default();
    let form = MultipartForm::new().add_text("crf", "23");

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<serde_json::Value>(),
        serde_json::json!({ "error": "Video file is required" })
    );
    assert!(app.encoder_args().is_none());
}

#[tokio::test]
async fn non_multipart_body_counts_as_missing_file() {
    let app = setup_default();

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .json(&serde_json::json!({ "video": "nope" }))
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "Video file is required"
    );
}

#[tokio::test]
async fn oversize_upload_is_rejected_and_removed() {
    let app = setup(&ENCODERS.copy, 1024);
    let form = MultipartForm::new().add_part("video", video_part(fake_video(64 * 1024), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 413);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["code"], "LIMIT_FILE_SIZE");
    assert!(body["error"].is_string());
    assert!(app.encoder_args().is_none());
    app.assert_temp_dirs_empty().await;
}

#[tokio::test]
async fn second_file_is_rejected() {
    let app = setup_default();
    let form = MultipartForm::new()
        .add_part("video", video_part(fake_video(1024), "video/mp4"))
        .add_part("video", video_part(fake_video(1024), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<serde_json::Value>()["code"], "LIMIT_FILE_COUNT");
    assert!(app.encoder_args().is_none());
    app.assert_temp_dirs_empty().await;
}

#[tokio::test]
async fn file_under_unexpected_field_is_rejected() {
    let app = setup_default();
    let form = MultipartForm::new().add_part("file", video_part(fake_video(1024), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<serde_json::Value>()["code"],
        "LIMIT_UNEXPECTED_FILE"
    );
}

#[tokio::test]
async fn encoder_failure_returns_generic_error_and_cleans_up() {
    let app = setup(&ENCODERS.failing, 64 * 1024 * 1024);
    let form = MultipartForm::new().add_part("video", video_part(fake_video(4096), "video/mp4"));

    let response = app
        .server
        .post("/api/optimize")
        .add_header("x-api-key", API_KEY)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 500);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body, serde_json::json!({ "error": "Video optimization failed" }));
    assert!(app.encoder_args().is_some());
    app.assert_temp_dirs_empty().await;
}
