//! Blog Server binary.
//!
//! Reads the file named by `BLOG_CONFIG` (or the default locations), sets up
//! tracing and serves until Ctrl+C.

use anyhow::Context;
use blog_server::{
    config::{Config, LoggingConfig},
    run,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable naming an explicit config file
const CONFIG_ENV: &str = "BLOG_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, source) = load_config()?;

    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %source,
        bucket = %config.blob.bucket,
        "Starting blog server"
    );

    run(config).await
}

fn load_config() -> anyhow::Result<(Config, String)> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path))?;
            Ok((config, path))
        }
        Err(_) => {
            let config = Config::load_default().context("Failed to load configuration")?;
            Ok((config, "default locations".to_string()))
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},hyper=warn,rocksdb=warn", config.level))
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let json = config.format == "json";

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().pretty()))
        .try_init()?;

    Ok(())
}
