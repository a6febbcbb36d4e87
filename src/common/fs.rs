use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Removes a file, treating "already gone" as success.
pub async fn safe_unlink(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn safe_unlink_blocking(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Request-scoped set of temporary files (staged upload, encoder output).
///
/// `release` deletes every tracked path once. If the guard is dropped without
/// being released (early return, panic, cancelled request future) the paths
/// are removed synchronously in `Drop`.
#[derive(Debug)]
pub struct TempArtifacts {
    request_id: String,
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            paths: Vec::new(),
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Deletes all tracked paths, returning the failures (already absent is not one).
    pub async fn release(mut self) -> Vec<(PathBuf, io::Error)> {
        let paths = std::mem::take(&mut self.paths);
        let mut failures = Vec::new();
        for path in paths {
            match safe_unlink(&path).await {
                Ok(()) => debug!(request_id = %self.request_id, path = %path.display(), "temp file removed"),
                Err(e) => {
                    warn!(request_id = %self.request_id, path = %path.display(), error = %e, "cleanup failed");
                    failures.push((path, e));
                }
            }
        }
        failures
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = safe_unlink_blocking(&path) {
                warn!(request_id = %self.request_id, path = %path.display(), error = %e, "cleanup failed");
            }
        }
    }
}
