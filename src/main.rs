use anyhow::Context;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;
use video_optimizer::{app, common::fs::ensure_dir, config::settings::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::new().context("failed to load configuration")?;

    ensure_dir(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    ensure_dir(&config.output_dir)
        .await
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let app = app::create_app(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on port {}", addr.port());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
