use crate::config::env::{self, EnvKey};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub server_port: u16,
    pub max_file_size: u64,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub ffmpeg_path: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("server_port", &self.server_port)
            .field("max_file_size", &self.max_file_size)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .finish()
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(env::process_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_key: env::get(&lookup, EnvKey::ApiKey)
                .ok_or(ConfigError::Missing(EnvKey::ApiKey.as_str()))?,
            server_port: env::get_parsed(&lookup, EnvKey::ServerPort, DEFAULT_PORT),
            max_file_size: env::get_parsed(&lookup, EnvKey::MaxFileSize, DEFAULT_MAX_FILE_SIZE),
            upload_dir: env::get_or(&lookup, EnvKey::UploadDir, "tmp/uploads").into(),
            output_dir: env::get_or(&lookup, EnvKey::OutputDir, "tmp/optimized").into(),
            ffmpeg_path: env::get_or(&lookup, EnvKey::FfmpegPath, "ffmpeg"),
        })
    }
}
