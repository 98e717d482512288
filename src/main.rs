use std::path::PathBuf;

mod app;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod services;

use app::App;
use config::Config;
use error::{AppError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (INFO and up by default, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("rss.toml"));

    // A missing or malformed configuration aborts before any feed is touched
    let config = Config::load(&config_path)?;

    let access_token = std::env::var("RAINDROP_TOKEN")
        .map_err(|_| AppError::Config("RAINDROP_TOKEN is not set".to_string()))?;

    let mut app = App::new(config, access_token)?;
    app.run().await;
    app.save()?;

    Ok(())
}
