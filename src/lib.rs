//! Video Upload Gateway Library
//!
//! Brokers video uploads to S3-compatible storage.
//!
//! # Features
//!
//! - **Client-direct uploads**: time-bound presigned PUT URLs
//! - **Server-mediated uploads**: streamed multipart uploads with bounded
//!   concurrency and abort on failure
//! - **Stable errors**: storage failures translated into one message shape
//! - **Proxy aware**: the storage host always bypasses the outbound proxy
//! - **Preview alerts**: best-effort SMTP email when a preview page is opened
//!
//! # Example
//!
//! ```no_run
//! use video_upload_gateway::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod network;
pub mod notify;
pub mod router;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
