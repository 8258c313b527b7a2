//! Video Upload Gateway - brokers video uploads to S3-compatible storage

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use video_upload_gateway::{config::Config, server::Server};

/// Video Upload Gateway - presigned and multipart uploads to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "video-upload-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Video Upload Gateway v{}", video_upload_gateway::VERSION);

    let config = Config::load(&args.config)?;
    info!(
        path = ?args.config,
        address = %config.server.address,
        metrics = config.metrics.enabled,
        "Loaded configuration"
    );

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
