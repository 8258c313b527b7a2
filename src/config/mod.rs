//! Configuration module for the upload gateway
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! Storage credentials are allowed to be empty at load time. The upload
//! endpoints report the incomplete configuration per request instead of
//! refusing to start, so the preview notification endpoint keeps working.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Minimum part size (5 MiB) accepted by S3 multipart uploads
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum number of parts in a single multipart upload
pub const MAX_PARTS: u64 = 10_000;

/// Floor applied to the presigned URL lifetime, in seconds
pub const MIN_UPLOAD_URL_EXPIRES: i64 = 60;

/// Longest lifetime SigV4 allows for a presigned URL, in seconds
pub const MAX_UPLOAD_URL_EXPIRES: i64 = 604_800;

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .address
            .parse::<SocketAddr>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid server address '{}': {}",
                    self.server.address, e
                ))
            })?;

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_upload_bytes must be greater than zero".into(),
            ));
        }

        if self.upload.part_size < MIN_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "part_size {} is below the S3 minimum of {} bytes",
                self.upload.part_size, MIN_PART_SIZE
            )));
        }

        if self.upload.concurrent_parts == 0 {
            return Err(ConfigError::ValidationError(
                "concurrent_parts must be at least 1".into(),
            ));
        }

        let max_object = self.upload.part_size as u64 * MAX_PARTS;
        if self.server.max_upload_bytes > max_object {
            return Err(ConfigError::ValidationError(format!(
                "max_upload_bytes {} exceeds what {} parts of {} bytes can hold",
                self.server.max_upload_bytes, MAX_PARTS, self.upload.part_size
            )));
        }

        if self.storage.upload_url_expires > MAX_UPLOAD_URL_EXPIRES {
            return Err(ConfigError::ValidationError(format!(
                "upload_url_expires {} exceeds the SigV4 maximum of {} seconds",
                self.storage.upload_url_expires, MAX_UPLOAD_URL_EXPIRES
            )));
        }

        if !self.storage.endpoint.is_empty() && !is_valid_http_url(&self.storage.endpoint) {
            return Err(ConfigError::ValidationError(
                "Invalid storage endpoint: must start with http:// or https://".into(),
            ));
        }

        if let Some(ref proxy) = self.storage.proxy {
            if !is_valid_http_url(proxy) {
                return Err(ConfigError::ValidationError(
                    "Invalid storage proxy: must start with http:// or https://".into(),
                ));
            }
        }

        if !(-12..=14).contains(&self.notify.display_utc_offset_hours) {
            return Err(ConfigError::ValidationError(format!(
                "display_utc_offset_hours {} is out of range",
                self.notify.display_utc_offset_hours
            )));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "metrics port must be non-zero when metrics are enabled".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    /// Largest file accepted by `POST /api/upload`, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024 * 1024 // 5 GiB
}

/// S3-compatible storage configuration
///
/// Every string may be empty; [`crate::s3::StorageCredentials::from_config`]
/// reports which required fields are missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: String,
    /// Base used for public object URLs instead of `endpoint`
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub bucket: String,
    /// Presigned URL lifetime in seconds, clamped to at least 60
    #[serde(default = "default_upload_url_expires")]
    pub upload_url_expires: i64,
    /// Outbound forward proxy; the storage host always bypasses it
    #[serde(default)]
    pub proxy: Option<String>,
    /// Comma-separated hosts that bypass the proxy
    #[serde(default)]
    pub no_proxy: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            public_base_url: String::new(),
            region: default_region(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            upload_url_expires: default_upload_url_expires(),
            proxy: None,
            no_proxy: String::new(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_upload_url_expires() -> i64 {
    3600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            concurrent_parts: default_concurrent_parts(),
        }
    }
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

fn default_concurrent_parts() -> usize {
    4
}

/// Preview notification (SMTP) configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Implicit TLS when true, STARTTLS otherwise
    #[serde(default)]
    pub smtp_secure: bool,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_pass: String,
    /// Recipient of the preview notification
    #[serde(default)]
    pub to: String,
    /// Sender address; falls back to `smtp_user`
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub app_base_url: String,
    /// Offset used for the human-readable visit time
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_secure: false,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            to: String::new(),
            from: String::new(),
            app_base_url: String::new(),
            display_utc_offset_hours: default_display_utc_offset_hours(),
        }
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_secure", &self.smtp_secure)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"<redacted>")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("app_base_url", &self.app_base_url)
            .field("display_utc_offset_hours", &self.display_utc_offset_hours)
            .finish()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_display_utc_offset_hours() -> i32 {
    8
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
