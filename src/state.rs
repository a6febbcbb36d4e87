use crate::config::settings::AppConfig;
use crate::infrastructure::encoder::ffmpeg::Transcoder;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transcoder: Transcoder,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let transcoder = Transcoder::new(config.ffmpeg_path.clone());
        Self {
            config: Arc::new(config),
            transcoder,
        }
    }
}
