use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ApiKey,
    ServerPort,
    MaxFileSize,
    UploadDir,
    OutputDir,
    FfmpegPath,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ApiKey => "API_KEY_HASH",
            EnvKey::ServerPort => "PORT",
            EnvKey::MaxFileSize => "MAX_FILE_SIZE",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::OutputDir => "OUTPUT_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
        }
    }
}

/// Reads variables from the process environment.
pub fn process_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

pub fn get<F>(lookup: &F, key: EnvKey) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key.as_str()).filter(|v| !v.is_empty())
}

pub fn get_or<F>(lookup: &F, key: EnvKey, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    get(lookup, key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<F, T: FromStr>(lookup: &F, key: EnvKey, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
{
    match get(lookup, key) {
        Some(val) => val.trim().parse::<T>().unwrap_or(default),
        None => default,
    }
}
