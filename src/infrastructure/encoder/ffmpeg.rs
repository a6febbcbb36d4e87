use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::common::ids::unix_millis;
use crate::modules::optimize::dto::{CompressionOptions, EncodingProfile};

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to start encoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("encoder exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("encoder reported success but produced no output")]
    MissingOutput,

    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Notifications emitted while a job runs. The terminal outcome is the
/// `Result` returned by [`Transcoder::run`], never an event.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    Started { command_line: String },
    Progress { percent: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Created,
    Running,
    Completed(PathBuf),
    Failed(String),
}

#[derive(Debug)]
pub struct TranscodeJob {
    pub request_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub profile: EncodingProfile,
    pub state: JobState,
}

impl TranscodeJob {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_dir: &Path,
        request_id: impl Into<String>,
        options: &CompressionOptions,
    ) -> Self {
        let input_path = input_path.into();
        let output_path = output_dir.join(output_file_name(&input_path, unix_millis()));
        Self {
            request_id: request_id.into(),
            input_path,
            output_path,
            profile: options.resolve(),
            state: JobState::Created,
        }
    }
}

/// `optimized-<millis>-<input stem>.mp4`
pub fn output_file_name(input_path: &Path, millis: i128) -> String {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    format!("optimized-{millis}-{stem}.mp4")
}

pub fn build_args(input: &Path, output: &Path, profile: &EncodingProfile) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostats", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(input.to_string_lossy().into_owned());

    args.extend([
        "-c:v".to_string(),
        profile.video_codec.to_string(),
        "-crf".to_string(),
        profile.crf.to_string(),
        "-preset".to_string(),
        profile.preset.to_string(),
        // Height follows the aspect ratio, rounded to an even number.
        "-vf".to_string(),
        format!("scale={}:-2", profile.width),
        "-r".to_string(),
        profile.fps.to_string(),
        "-c:a".to_string(),
        profile.audio_codec.to_string(),
        "-b:a".to_string(),
        profile.audio_bitrate.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
    ]);

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Runs the external encoder binary. One child process per call, no limit
/// on how many run at once.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
}

impl Transcoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn run(
        &self,
        job: &mut TranscodeJob,
        events: Option<mpsc::UnboundedSender<TranscodeEvent>>,
    ) -> Result<PathBuf, EncodingError> {
        let result = self.execute(job, events.as_ref()).await;
        job.state = match &result {
            Ok(path) => JobState::Completed(path.clone()),
            Err(e) => JobState::Failed(e.to_string()),
        };
        result
    }

    async fn execute(
        &self,
        job: &mut TranscodeJob,
        events: Option<&mpsc::UnboundedSender<TranscodeEvent>>,
    ) -> Result<PathBuf, EncodingError> {
        let args = build_args(&job.input_path, &job.output_path, &job.profile);
        let command_line = format!("{} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        job.state = JobState::Running;
        debug!(request_id = %job.request_id, pid = ?child.id(), "encoder spawned");
        emit(events, TranscodeEvent::Started { command_line });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("encoder stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("encoder stderr not captured"))?;

        let (duration_tx, duration_rx) = watch::channel(None::<f64>);

        let (status, stderr_tail, progress) = tokio::join!(
            child.wait(),
            read_diagnostics(stderr, duration_tx),
            read_progress(stdout, duration_rx, events),
        );

        let status: ExitStatus = status?;
        let stderr_tail = stderr_tail?;
        progress?;

        if !status.success() {
            return Err(EncodingError::Failed {
                code: status.code(),
                stderr: stderr_tail.into_iter().collect::<Vec<_>>().join("\n"),
            });
        }

        match tokio::fs::metadata(&job.output_path).await {
            Ok(meta) if meta.is_file() => Ok(job.output_path.clone()),
            Ok(_) => Err(EncodingError::MissingOutput),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EncodingError::MissingOutput),
            Err(e) => Err(e.into()),
        }
    }
}

fn emit(events: Option<&mpsc::UnboundedSender<TranscodeEvent>>, event: TranscodeEvent) {
    if let Some(tx) = events {
        // The receiver going away only means nobody is listening any more.
        let _ = tx.send(event);
    }
}

// Collects the last stderr lines for error reports and publishes the
// input duration as soon as the encoder prints it.
async fn read_diagnostics<R>(
    stderr: R,
    duration_tx: watch::Sender<Option<f64>>,
) -> io::Result<VecDeque<String>>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(stderr).split(b'\n');
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment).trim_end().to_string();
        if duration_tx.borrow().is_none() {
            if let Some(duration) = parse_duration_line(&line) {
                let _ = duration_tx.send(Some(duration));
            }
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Ok(tail)
}

async fn read_progress<R>(
    stdout: R,
    duration_rx: watch::Receiver<Option<f64>>,
    events: Option<&mpsc::UnboundedSender<TranscodeEvent>>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(stdout).split(b'\n');
    let mut tracker = ProgressTracker::default();

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        let Some(elapsed) = parse_progress_line(line.trim()) else {
            continue;
        };
        // ffmpeg prints the input duration before any progress; earlier lines are skipped.
        let Some(total) = *duration_rx.borrow() else {
            continue;
        };
        if let Some(percent) = tracker.update(elapsed, total) {
            emit(events, TranscodeEvent::Progress { percent });
        }
    }

    Ok(())
}

/// Turns elapsed/total into a percentage that never goes backwards.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<f64>,
}

impl ProgressTracker {
    pub fn update(&mut self, elapsed_secs: f64, total_secs: f64) -> Option<f64> {
        if total_secs <= 0.0 || !elapsed_secs.is_finite() {
            return None;
        }
        let percent = (elapsed_secs / total_secs * 100.0).clamp(0.0, 100.0);
        match self.last {
            Some(last) if percent < last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }
}

/// Elapsed output time in seconds from one `-progress` key/value line.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    match key {
        // out_time_ms is also microseconds in ffmpeg's progress output.
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|us| us as f64 / 1_000_000.0),
        "out_time" => parse_timestamp(value),
        _ => None,
    }
}

/// Input duration from a stderr line like `  Duration: 00:01:02.03, start: ...`.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?.trim();
    parse_timestamp(value)
}

fn parse_timestamp(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.starts_with('-') {
        return Some(0.0);
    }
    let mut parts = value.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
